//! Compiled constraint view
//!
//! A [`Constraint`] binds one schema to the set of variables a request
//! selects. It is populated by the compiler, sealed by [`Constraint::finish`]
//! and read-only afterwards.
//!
//! ```text
//! add_variable / add_redef / set_filter / add_attribute
//!        │
//!        ▼
//! finish():  expand ─► compute_dimensions ─► collect enums ─► collect groups
//!        │
//!        ▼
//! references / reference_iterator / projection_iterator / match_row / filter_iterator
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::dmr::{DimId, Dimension, Dmr, EnumId, GroupId, NodeRef, Parent, VarId, VarSort};
use crate::error::{CeError, Result};
use crate::filter::{Filter, FilterIterator};
use crate::odometer::Odometer;
use crate::slice::Slice;
use crate::value::Row;

/// Finalized slices, resolved dimensions and projection slices of a segment.
type ResolvedSegment = (Vec<Slice>, Vec<Dimension>, Vec<Slice>);

// ============================================================================
// Segment
// ============================================================================

/// The compiled binding of one referenced variable.
#[derive(Debug, Clone)]
pub struct Segment {
    pub(crate) var: VarId,
    /// Requested slices; finalized and padded to the rank by `finish`.
    pub(crate) slices: Vec<Slice>,
    /// Resolved dimension per position, filled by `finish`.
    pub(crate) dims: Vec<Dimension>,
    /// Index ranges the projection iterates, filled by `finish`.
    pub(crate) projection: Vec<Slice>,
    pub(crate) filter: Option<Filter>,
}

impl Segment {
    fn new(var: VarId, slices: Vec<Slice>) -> Self {
        Self {
            var,
            slices,
            dims: Vec::new(),
            projection: Vec::new(),
            filter: None,
        }
    }

    pub fn variable(&self) -> VarId {
        self.var
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    /// Index ranges in the variable's own coordinates.
    pub fn projection_slices(&self) -> &[Slice] {
        &self.projection
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Elements selected by this segment's projection.
    pub fn selected_count(&self) -> u64 {
        self.projection
            .iter()
            .fold(1u64, |acc, s| acc.saturating_mul(s.count()))
    }
}

// ============================================================================
// Constraint
// ============================================================================

#[derive(Debug, Clone)]
pub struct Constraint {
    dmr: Arc<Dmr>,
    segments: Vec<Segment>,
    /// Parallel to `segments`.
    variables: Vec<VarId>,
    redefs: Vec<(DimId, Slice)>,
    redefined: HashMap<DimId, Dimension>,
    dim_refs: Vec<DimId>,
    enum_refs: Vec<EnumId>,
    group_refs: Vec<GroupId>,
    attributes: HashMap<NodeRef, Vec<(String, String)>>,
    finished: bool,
}

impl Constraint {
    /// An empty, open view over `dmr`.
    pub fn new(dmr: Arc<Dmr>) -> Self {
        Self {
            dmr,
            segments: Vec::new(),
            variables: Vec::new(),
            redefs: Vec::new(),
            redefined: HashMap::new(),
            dim_refs: Vec::new(),
            enum_refs: Vec::new(),
            group_refs: Vec::new(),
            attributes: HashMap::new(),
            finished: false,
        }
    }

    /// The "select everything" view: every top-level variable, whole.
    pub fn universal(dmr: Arc<Dmr>) -> Result<Self> {
        let mut view = Self::new(Arc::clone(&dmr));
        for var in dmr.top_level_variables() {
            view.add_variable(var, Vec::new())?;
        }
        view.finish()?;
        Ok(view)
    }

    pub fn dmr(&self) -> &Arc<Dmr> {
        &self.dmr
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.finished {
            return Err(CeError::State(format!("{} on a finished constraint", op)));
        }
        Ok(())
    }

    pub(crate) fn ensure_finished(&self, op: &str) -> Result<()> {
        if !self.finished {
            return Err(CeError::State(format!("{} before finish", op)));
        }
        Ok(())
    }

    fn position(&self, var: VarId) -> Option<usize> {
        self.variables.iter().position(|v| *v == var)
    }

    // ------------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------------

    /// Register `var` with its requested slices.
    ///
    /// Enclosing compounds are registered first. A repeated reference keeps
    /// the existing segment; it may supply slices the first one lacked but
    /// may not change them.
    pub fn add_variable(&mut self, var: VarId, slices: Vec<Slice>) -> Result<()> {
        self.ensure_open("add_variable")?;
        let v = self.dmr.variable(var);
        if slices.len() > v.rank() {
            return Err(CeError::TooManySlices {
                var: self.dmr.fqn(var),
                rank: v.rank(),
                given: slices.len(),
            });
        }
        let owner = v.parent;
        if let Parent::Compound(parent) = owner {
            if self.position(parent).is_none() {
                self.add_variable(parent, Vec::new())?;
            }
        }

        match self.position(var) {
            Some(i) => {
                let segment = &mut self.segments[i];
                if segment.slices.is_empty() {
                    segment.slices = slices;
                } else if !slices.is_empty() && segment.slices != slices {
                    return Err(CeError::ConflictingSlices(self.dmr.fqn(var)));
                }
            }
            None => {
                trace!(var = %self.dmr.fqn(var), "segment added");
                self.segments.push(Segment::new(var, slices));
                self.variables.push(var);
            }
        }
        Ok(())
    }

    /// Resize shared dimension `dim` to the elements `slice` selects.
    pub fn add_redef(&mut self, dim: DimId, slice: Slice) -> Result<()> {
        self.ensure_open("add_redef")?;
        let original = self.dmr.dimension(dim);
        if !original.shared {
            return Err(CeError::UnknownDimension(format!(
                "anonymous dimension of size {}",
                original.size
            )));
        }
        let slice = slice.finish(original.size)?;
        let clone = original.resized(slice.count());
        self.redefined.insert(dim, clone);
        match self.redefs.iter_mut().find(|(d, _)| *d == dim) {
            Some(entry) => entry.1 = slice,
            None => self.redefs.push((dim, slice)),
        }
        Ok(())
    }

    /// Attach a row filter to a sequence. A second filter is and-ed on.
    pub fn set_filter(&mut self, sequence: VarId, filter: Filter) -> Result<()> {
        self.ensure_open("set_filter")?;
        if self.dmr.variable(sequence).sort != VarSort::Sequence {
            return Err(CeError::FilterTarget(self.dmr.fqn(sequence)));
        }
        if self.position(sequence).is_none() {
            self.add_variable(sequence, Vec::new())?;
        }
        if let Some(i) = self.position(sequence) {
            let segment = &mut self.segments[i];
            segment.filter = Some(match segment.filter.take() {
                Some(existing) => Filter::and(existing, filter),
                None => filter,
            });
        }
        Ok(())
    }

    /// Attach an extra attribute to a node of the view.
    pub fn add_attribute(
        &mut self,
        node: impl Into<NodeRef>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.ensure_open("add_attribute")?;
        self.attributes
            .entry(node.into())
            .or_default()
            .push((name.into(), value.into()));
        Ok(())
    }

    pub fn attributes(&self, node: impl Into<NodeRef>) -> &[(String, String)] {
        self.attributes
            .get(&node.into())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // ------------------------------------------------------------------------
    // Expansion
    // ------------------------------------------------------------------------

    /// Select every field of each top-level compound that has no field
    /// referenced.
    ///
    /// Compound fields added this way expand in turn. A nested compound that
    /// was named without fields is left as it is. Running it again adds
    /// nothing.
    pub fn expand(&mut self) -> Result<()> {
        self.ensure_open("expand")?;
        let dmr = Arc::clone(&self.dmr);
        let mut pending: VecDeque<VarId> = self
            .segments
            .iter()
            .map(|s| s.var)
            .filter(|id| {
                let var = dmr.variable(*id);
                var.is_top_level()
                    && var.sort.is_compound()
                    && !var.fields.iter().any(|f| self.variables.contains(f))
            })
            .collect();

        while let Some(id) = pending.pop_front() {
            let var = dmr.variable(id);
            trace!(var = %dmr.fqn(id), fields = var.fields.len(), "expanding compound");
            for field in &var.fields {
                if self.variables.contains(field) {
                    continue;
                }
                self.segments.push(Segment::new(*field, Vec::new()));
                self.variables.push(*field);
                if dmr.variable(*field).sort.is_compound() {
                    pending.push_back(*field);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Finish
    // ------------------------------------------------------------------------

    /// Expand, resolve dimensions, collect back-references and seal.
    ///
    /// On error nothing computed here is kept and the view stays open.
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_open("finish")?;
        self.expand()?;

        let (resolved, dim_refs) = self.compute_dimensions()?;
        for (segment, (slices, dims, projection)) in self.segments.iter_mut().zip(resolved) {
            segment.slices = slices;
            segment.dims = dims;
            segment.projection = projection;
        }
        self.dim_refs = dim_refs;
        self.enum_refs = self.collect_enumerations();
        self.group_refs = self.collect_groups();
        self.finished = true;
        Ok(())
    }

    fn compute_dimensions(&self) -> Result<(Vec<ResolvedSegment>, Vec<DimId>)> {
        // Redefined dimensions are always referenced.
        let mut dim_refs: Vec<DimId> = self.redefs.iter().map(|(d, _)| *d).collect();
        let mut resolved = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            let var = self.dmr.variable(segment.var);
            let mut requested = segment.slices.clone();
            requested.resize(var.rank(), Slice::whole());

            let mut slices = Vec::with_capacity(var.rank());
            let mut dims = Vec::with_capacity(var.rank());
            let mut projection = Vec::with_capacity(var.rank());

            for (slice, dim0) in requested.into_iter().zip(&var.dims) {
                let redef = self.redefs.iter().find(|(d, _)| d == dim0).map(|(_, s)| *s);
                let newdim = self
                    .redefined
                    .get(dim0)
                    .cloned()
                    .unwrap_or_else(|| self.dmr.dimension(*dim0).clone());

                if slice.constrained {
                    let slice = slice.finish(newdim.size)?;
                    dims.push(Dimension::anonymous(slice.count()));
                    slices.push(slice);
                    projection.push(slice);
                } else {
                    let full = Slice::full(newdim.size);
                    slices.push(full);
                    projection.push(redef.unwrap_or(full));
                    dims.push(newdim);
                    if self.dmr.dimension(*dim0).shared && !dim_refs.contains(dim0) {
                        dim_refs.push(*dim0);
                    }
                }
            }

            trace!(
                var = %self.dmr.fqn(segment.var),
                sizes = ?dims.iter().map(|d| d.size).collect::<Vec<_>>(),
                "dimensions resolved"
            );
            resolved.push((slices, dims, projection));
        }
        Ok((resolved, dim_refs))
    }

    fn collect_enumerations(&self) -> Vec<EnumId> {
        let mut enums = Vec::new();
        for var in &self.variables {
            if let VarSort::Atomic(ty) = self.dmr.variable(*var).sort {
                if let Some(e) = ty.enumeration() {
                    if !enums.contains(&e) {
                        enums.push(e);
                    }
                }
            }
        }
        enums
    }

    fn collect_groups(&self) -> Vec<GroupId> {
        let owners = self
            .variables
            .iter()
            .map(|v| self.dmr.owning_group(*v))
            .chain(self.dim_refs.iter().filter_map(|d| self.dmr.dimension(*d).group))
            .chain(self.enum_refs.iter().map(|e| self.dmr.enumeration(*e).group));

        let mut groups = Vec::new();
        for owner in owners {
            for g in self.dmr.group_path(owner) {
                if !groups.contains(&g) {
                    groups.push(g);
                }
            }
        }
        groups
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Is `node` part of this view?
    pub fn references(&self, node: impl Into<NodeRef>) -> bool {
        match node.into() {
            NodeRef::Dimension(d) => self.dim_refs.contains(&d),
            NodeRef::Enumeration(e) => self.enum_refs.contains(&e),
            NodeRef::Group(g) => self.group_refs.contains(&g),
            NodeRef::Variable(v) => self.variables.contains(&v),
        }
    }

    /// Referenced dimensions, then enumerations, then variables.
    pub fn reference_iterator(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.dim_refs
            .iter()
            .map(|d| NodeRef::Dimension(*d))
            .chain(self.enum_refs.iter().map(|e| NodeRef::Enumeration(*e)))
            .chain(self.variables.iter().map(|v| NodeRef::Variable(*v)))
    }

    /// Index tuples selected for `var`; `None` if the view does not include it.
    pub fn projection_iterator(&self, var: VarId) -> Result<Option<Odometer>> {
        self.ensure_finished("projection_iterator")?;
        Ok(self
            .segment(var)
            .map(|s| Odometer::new(s.projection.clone())))
    }

    /// Does `row` pass the filter on `sequence`? True when there is none.
    pub fn match_row<R: Row + ?Sized>(&self, sequence: VarId, row: &R) -> Result<bool> {
        self.ensure_finished("match_row")?;
        match self.segment(sequence).and_then(Segment::filter) {
            Some(filter) => filter.matches(&self.dmr, row),
            None => Ok(true),
        }
    }

    /// Wrap a row source so only matching rows come out.
    pub fn filter_iterator<I>(
        &self,
        sequence: VarId,
        rows: I,
    ) -> Result<FilterIterator<'_, I::IntoIter>>
    where
        I: IntoIterator,
        I::Item: Row,
    {
        self.ensure_finished("filter_iterator")?;
        if self.dmr.variable(sequence).sort != VarSort::Sequence {
            return Err(CeError::FilterTarget(self.dmr.fqn(sequence)));
        }
        Ok(FilterIterator::new(self, sequence, rows.into_iter()))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Segments in first-reference order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, var: VarId) -> Option<&Segment> {
        self.position(var).map(|i| &self.segments[i])
    }

    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }

    /// Redefinitions in declaration order, with finalized slices.
    pub fn redefinitions(&self) -> &[(DimId, Slice)] {
        &self.redefs
    }

    /// The resized clone standing in for `dim`, if it was redefined.
    pub fn redefined_dimension(&self, dim: DimId) -> Option<&Dimension> {
        self.redefined.get(&dim)
    }

    pub fn referenced_dimensions(&self) -> &[DimId] {
        &self.dim_refs
    }

    pub fn referenced_enumerations(&self) -> &[EnumId] {
        &self.enum_refs
    }

    pub fn referenced_groups(&self) -> &[GroupId] {
        &self.group_refs
    }

    /// Elements selected for `var`, once finished.
    pub fn selected_count(&self, var: VarId) -> Option<u64> {
        if !self.finished {
            return None;
        }
        self.segment(var).map(Segment::selected_count)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "constraint on {} ({} segments{})",
            self.dmr.name(),
            self.segments.len(),
            if self.finished { ", finished" } else { "" }
        )?;
        for (dim, slice) in &self.redefs {
            let name = self.dmr.dim_fqn(*dim).unwrap_or_default();
            writeln!(f, "  redef {} = {}", name, slice)?;
        }
        for segment in &self.segments {
            write!(f, "  {}", self.dmr.fqn(segment.var))?;
            for slice in &segment.slices {
                write!(f, "{}", slice)?;
            }
            if !segment.dims.is_empty() {
                let sizes: Vec<String> = segment.dims.iter().map(|d| d.size.to_string()).collect();
                write!(f, " dims=({})", sizes.join(","))?;
            }
            if let Some(filter) = &segment.filter {
                write!(f, " |{}", filter)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
