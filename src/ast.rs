//! Constraint-expression syntax tree
//!
//! Produced by [`crate::parser`] (or any other front end) and consumed by
//! [`crate::compiler`]. Names are unresolved strings at this stage.
//!
//! ```text
//! /g/dim=[0:4];/g/s{a;b[1:2]};seq|depth>=100,depth<200
//! └─ DimRedef ─┘└─ Projection ─┘└──────── Selection ──────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::slice::Slice;
use crate::value::Value;

// =============================================================================
// CORE AST TYPES
// =============================================================================

/// A complete constraint: dimension redefinitions followed by clauses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CeAst {
    pub redefs: Vec<DimRedef>,
    pub clauses: Vec<Clause>,
}

/// `name=[slice]`: resize a shared dimension for the whole view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimRedef {
    pub name: String,
    pub slice: Slice,
}

/// One `;`-separated clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// Select a segment tree.
    Projection(SegmentTree),
    /// Select a segment tree and filter the rows of its target sequence.
    Selection {
        projection: SegmentTree,
        filter: CeExpr,
    },
}

impl Clause {
    pub fn projection(&self) -> &SegmentTree {
        match self {
            Clause::Projection(tree) => tree,
            Clause::Selection { projection, .. } => projection,
        }
    }
}

/// A name with optional slices, continued by `.child` or `{fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTree {
    pub name: String,
    pub slices: Vec<Slice>,
    /// `.child` continuation.
    pub path: Option<Box<SegmentTree>>,
    /// `{a;b}` field list.
    pub fields: Vec<Clause>,
}

impl SegmentTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slices: Vec::new(),
            path: None,
            fields: Vec::new(),
        }
    }

    pub fn with_slices(mut self, slices: Vec<Slice>) -> Self {
        self.slices = slices;
        self
    }

    pub fn with_path(mut self, child: SegmentTree) -> Self {
        self.path = Some(Box::new(child));
        self
    }

    pub fn with_fields(mut self, fields: Vec<Clause>) -> Self {
        self.fields = fields;
        self
    }
}

// =============================================================================
// FILTER EXPRESSIONS
// =============================================================================

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    /// `~=`: left side matches the right side as a regular expression.
    Req,
}

impl Operator {
    /// Operator to use when the operands are swapped.
    pub fn flipped(self) -> Self {
        match self {
            Operator::Lt => Operator::Gt,
            Operator::Gt => Operator::Lt,
            Operator::Le => Operator::Ge,
            Operator::Ge => Operator::Le,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Req => "~=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unresolved filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CeExpr {
    Constant(Value),
    FieldRef(String),
    Compare {
        op: Operator,
        lhs: Box<CeExpr>,
        rhs: Box<CeExpr>,
    },
    And(Box<CeExpr>, Box<CeExpr>),
    Not(Box<CeExpr>),
}

impl CeExpr {
    pub fn field(name: impl Into<String>) -> Self {
        CeExpr::FieldRef(name.into())
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        CeExpr::Constant(value.into())
    }

    pub fn compare(op: Operator, lhs: CeExpr, rhs: CeExpr) -> Self {
        CeExpr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn and(lhs: CeExpr, rhs: CeExpr) -> Self {
        CeExpr::And(Box::new(lhs), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: CeExpr) -> Self {
        CeExpr::Not(Box::new(inner))
    }
}
