//! DAP4 constraint-expression compiler and evaluator.
//!
//! Compiles a constraint expression against a dataset schema (DMR) into a
//! sealed view: which variables and fields are selected, with what
//! per-dimension slices and dimension redefinitions, and which row filters
//! apply to sequences.
//!
//! # Architecture
//!
//! ```text
//! "/d=[0:4];grid[0:2:4];cast|depth>100"
//!        │
//!        ▼ parse_constraint
//!      CeAst ──► CeCompiler ──► Constraint (sealed)
//!                   ▲              ├── references / reference_iterator
//!                  Dmr             ├── projection_iterator ──► Odometer
//!                                  ├── match_row / filter_iterator
//!                                  └── to_constraint_string
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dap4_ce::{compile_str, DmrBuilder, AtomicType};
//!
//! let mut b = DmrBuilder::new("demo");
//! let root = b.root();
//! let d = b.dimension(root, "d", 10);
//! b.atomic(root, "temp", AtomicType::Float32, &[d])?;
//! let dmr = std::sync::Arc::new(b.build());
//!
//! let view = compile_str(&dmr, "temp[0:2:8]")?;
//! assert_eq!(view.to_constraint_string()?, "/temp[0:2:8]");
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod constraint;
pub mod dmr;
pub mod error;
pub mod filter;
pub mod odometer;
pub mod parser;
mod render;
pub mod registry;
pub mod slice;
pub mod value;

pub use ast::{CeAst, CeExpr, Clause, DimRedef, Operator, SegmentTree};
pub use compiler::{compile, compile_str, CeCompiler};
pub use config::{CeConfig, ConfigLoader};
pub use constraint::{Constraint, Segment};
pub use dmr::{
    AtomicType, DimId, Dimension, Dmr, DmrBuilder, EnumId, GroupId, NodeRef, Parent, VarId,
    VarSort,
};
pub use error::{CeError, ErrorKind, Result};
pub use filter::{Filter, FilterIterator, LogicalOp};
pub use odometer::Odometer;
pub use parser::{parse_constraint, parse_filter, ParseError};
pub use registry::UniversalViews;
pub use slice::Slice;
pub use value::{Datum, MemoryRow, Row, Value};

/// Default compiled size limit for `~=` patterns (1 MiB).
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Default maximum filter nesting.
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 64;
