//! Dataset metadata (DMR) schema model
//!
//! An immutable tree of groups holding dimensions, enumerations and
//! variables. Nodes live in flat arenas owned by [`Dmr`] and are addressed by
//! typed ids, so a compiled view can refer to schema nodes without owning or
//! borrowing the tree.
//!
//! ```text
//! Group ─┬─ Dimension (shared, named)
//!        ├─ Enumeration
//!        ├─ Variable (Atomic | Structure | Sequence)
//!        │     └─ fields: Variable ...
//!        └─ Group ...
//! ```
//!
//! The schema is built once by a loader (here: [`DmrBuilder`]) and then only
//! read. Every built schema gets a process-unique [`Dmr::id`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CeError, Result};

static NEXT_DMR_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// NODE IDS
// =============================================================================

/// Index of a group in its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

/// Index of a dimension in its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimId(usize);

/// Index of an enumeration in its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(usize);

/// Index of a variable (top-level or field) in its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

/// Any schema node a view can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Group(GroupId),
    Dimension(DimId),
    Enumeration(EnumId),
    Variable(VarId),
}

impl From<GroupId> for NodeRef {
    fn from(id: GroupId) -> Self {
        NodeRef::Group(id)
    }
}

impl From<DimId> for NodeRef {
    fn from(id: DimId) -> Self {
        NodeRef::Dimension(id)
    }
}

impl From<EnumId> for NodeRef {
    fn from(id: EnumId) -> Self {
        NodeRef::Enumeration(id)
    }
}

impl From<VarId> for NodeRef {
    fn from(id: VarId) -> Self {
        NodeRef::Variable(id)
    }
}

// =============================================================================
// NODE TYPES
// =============================================================================

/// Atomic base types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    Url,
    Opaque,
    Enum(EnumId),
}

impl AtomicType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            AtomicType::Int8
                | AtomicType::UInt8
                | AtomicType::Int16
                | AtomicType::UInt16
                | AtomicType::Int32
                | AtomicType::UInt32
                | AtomicType::Int64
                | AtomicType::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, AtomicType::Float32 | AtomicType::Float64)
    }

    pub fn enumeration(&self) -> Option<EnumId> {
        match self {
            AtomicType::Enum(id) => Some(*id),
            _ => None,
        }
    }
}

/// What kind of variable a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSort {
    Atomic(AtomicType),
    Structure,
    Sequence,
}

impl VarSort {
    /// Structures and sequences have fields.
    pub fn is_compound(&self) -> bool {
        matches!(self, VarSort::Structure | VarSort::Sequence)
    }
}

/// Where a variable is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Group(GroupId),
    Compound(VarId),
}

impl From<GroupId> for Parent {
    fn from(id: GroupId) -> Self {
        Parent::Group(id)
    }
}

impl From<VarId> for Parent {
    fn from(id: VarId) -> Self {
        Parent::Compound(id)
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub parent: Option<GroupId>,
}

/// A dimension. Shared dimensions are named and declared in a group;
/// anonymous ones belong to a single variable declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: Option<String>,
    pub size: u64,
    pub shared: bool,
    pub group: Option<GroupId>,
}

impl Dimension {
    /// An unnamed, unshared dimension of the given size.
    pub fn anonymous(size: u64) -> Self {
        Self {
            name: None,
            size,
            shared: false,
            group: None,
        }
    }

    /// Copy of this dimension with a new size.
    pub fn resized(&self, size: u64) -> Self {
        Self {
            size,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Enumeration {
    pub name: String,
    pub base: AtomicType,
    pub constants: Vec<(String, i64)>,
    pub group: GroupId,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub sort: VarSort,
    /// Declared dimensions, outermost first. Empty for scalars.
    pub dims: Vec<DimId>,
    /// Fields of a structure or sequence, in declaration order.
    pub fields: Vec<VarId>,
    pub parent: Parent,
}

impl Variable {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_top_level(&self) -> bool {
        matches!(self.parent, Parent::Group(_))
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// An immutable dataset schema.
#[derive(Debug)]
pub struct Dmr {
    id: u64,
    name: String,
    groups: Vec<Group>,
    dims: Vec<Dimension>,
    enums: Vec<Enumeration>,
    vars: Vec<Variable>,
}

impl Dmr {
    /// Process-unique identity of this schema instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> GroupId {
        GroupId(0)
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    pub fn dimension(&self, id: DimId) -> &Dimension {
        &self.dims[id.0]
    }

    pub fn enumeration(&self, id: EnumId) -> &Enumeration {
        &self.enums[id.0]
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    /// All variables, fields included, in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.vars.len()).map(VarId)
    }

    /// Variables declared directly in a group (not fields).
    pub fn top_level_variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.variables()
            .filter(move |v| self.variable(*v).is_top_level())
    }

    /// The group a variable ultimately lives in.
    pub fn owning_group(&self, mut var: VarId) -> GroupId {
        loop {
            match self.variable(var).parent {
                Parent::Group(g) => return g,
                Parent::Compound(p) => var = p,
            }
        }
    }

    /// Groups from the root down to `group`, inclusive.
    pub fn group_path(&self, group: GroupId) -> Vec<GroupId> {
        let mut path = vec![group];
        let mut current = group;
        while let Some(parent) = self.group(current).parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// `/` for the root, `/a/b/` for nested groups.
    pub fn group_fqn(&self, group: GroupId) -> String {
        let mut fqn = String::from("/");
        for g in self.group_path(group).into_iter().skip(1) {
            fqn.push_str(&self.group(g).name);
            fqn.push('/');
        }
        fqn
    }

    /// `/g/var` for top-level variables, `/g/var.field` for fields.
    pub fn fqn(&self, var: VarId) -> String {
        let v = self.variable(var);
        match v.parent {
            Parent::Group(g) => format!("{}{}", self.group_fqn(g), v.name),
            Parent::Compound(p) => format!("{}.{}", self.fqn(p), v.name),
        }
    }

    /// FQN of a shared dimension; `None` for anonymous ones.
    pub fn dim_fqn(&self, dim: DimId) -> Option<String> {
        let d = self.dimension(dim);
        match (&d.name, d.group) {
            (Some(name), Some(g)) => Some(format!("{}{}", self.group_fqn(g), name)),
            _ => None,
        }
    }

    /// Top-level variables whose FQN matches `name` (a leading `/` is implied).
    pub fn find_variables(&self, name: &str) -> Vec<VarId> {
        let fqn = normalize_fqn(name);
        self.top_level_variables()
            .filter(|v| self.fqn(*v) == fqn)
            .collect()
    }

    /// Shared dimension with the given FQN (a leading `/` is implied).
    pub fn find_dimension(&self, name: &str) -> Option<DimId> {
        let fqn = normalize_fqn(name);
        (0..self.dims.len())
            .map(DimId)
            .filter(|d| self.dimension(*d).shared)
            .find(|d| self.dim_fqn(*d).as_deref() == Some(fqn.as_str()))
    }

    /// Field of a compound variable by simple name.
    pub fn field_by_name(&self, compound: VarId, name: &str) -> Option<VarId> {
        self.variable(compound)
            .fields
            .iter()
            .copied()
            .find(|f| self.variable(*f).name == name)
    }
}

fn normalize_fqn(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Incrementally assembles a [`Dmr`].
#[derive(Debug)]
pub struct DmrBuilder {
    name: String,
    groups: Vec<Group>,
    dims: Vec<Dimension>,
    enums: Vec<Enumeration>,
    vars: Vec<Variable>,
}

impl DmrBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: vec![Group {
                name: String::new(),
                parent: None,
            }],
            dims: Vec::new(),
            enums: Vec::new(),
            vars: Vec::new(),
        }
    }

    pub fn root(&self) -> GroupId {
        GroupId(0)
    }

    pub fn group(&mut self, parent: GroupId, name: impl Into<String>) -> GroupId {
        self.groups.push(Group {
            name: name.into(),
            parent: Some(parent),
        });
        GroupId(self.groups.len() - 1)
    }

    /// Declare a shared dimension.
    pub fn dimension(&mut self, group: GroupId, name: impl Into<String>, size: u64) -> DimId {
        self.dims.push(Dimension {
            name: Some(name.into()),
            size,
            shared: true,
            group: Some(group),
        });
        DimId(self.dims.len() - 1)
    }

    /// Declare an anonymous dimension for a single variable.
    pub fn anonymous_dimension(&mut self, size: u64) -> DimId {
        self.dims.push(Dimension::anonymous(size));
        DimId(self.dims.len() - 1)
    }

    pub fn enumeration(
        &mut self,
        group: GroupId,
        name: impl Into<String>,
        base: AtomicType,
        constants: &[(&str, i64)],
    ) -> EnumId {
        self.enums.push(Enumeration {
            name: name.into(),
            base,
            constants: constants
                .iter()
                .map(|(n, v)| (n.to_string(), *v))
                .collect(),
            group,
        });
        EnumId(self.enums.len() - 1)
    }

    pub fn atomic(
        &mut self,
        parent: impl Into<Parent>,
        name: impl Into<String>,
        ty: AtomicType,
        dims: &[DimId],
    ) -> Result<VarId> {
        self.variable(parent.into(), name.into(), VarSort::Atomic(ty), dims)
    }

    pub fn structure(
        &mut self,
        parent: impl Into<Parent>,
        name: impl Into<String>,
        dims: &[DimId],
    ) -> Result<VarId> {
        self.variable(parent.into(), name.into(), VarSort::Structure, dims)
    }

    pub fn sequence(
        &mut self,
        parent: impl Into<Parent>,
        name: impl Into<String>,
        dims: &[DimId],
    ) -> Result<VarId> {
        self.variable(parent.into(), name.into(), VarSort::Sequence, dims)
    }

    fn variable(
        &mut self,
        parent: Parent,
        name: String,
        sort: VarSort,
        dims: &[DimId],
    ) -> Result<VarId> {
        let id = VarId(self.vars.len());
        if let Parent::Compound(p) = parent {
            let owner = &mut self.vars[p.0];
            if !owner.sort.is_compound() {
                return Err(CeError::NotACompound {
                    scope: owner.name.clone(),
                    name,
                });
            }
            owner.fields.push(id);
        }
        self.vars.push(Variable {
            name,
            sort,
            dims: dims.to_vec(),
            fields: Vec::new(),
            parent,
        });
        Ok(id)
    }

    pub fn build(self) -> Dmr {
        Dmr {
            id: NEXT_DMR_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            groups: self.groups,
            dims: self.dims,
            enums: self.enums,
            vars: self.vars,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
