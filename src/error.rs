//! Constraint compiler error types.

use thiserror::Error;

use crate::parser::ParseError;

/// Broad classification of a [`CeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A name could not be bound to exactly one schema node.
    Resolution,
    /// A node has the wrong sort, rank or type for where it is used.
    Shape,
    /// A slice, redefinition or projection is out of bounds.
    Range,
    /// A filter could not be evaluated against a row.
    Evaluation,
    /// The constraint was used in the wrong lifecycle phase.
    State,
    /// The constraint text did not parse.
    Syntax,
}

/// Errors raised while compiling or evaluating a constraint.
#[derive(Debug, Clone, Error)]
pub enum CeError {
    // =========================================================================
    // Resolution errors
    // =========================================================================
    /// No variable with this fully-qualified name.
    #[error("undefined variable: {0}")]
    UndefinedName(String),

    /// More than one variable matches the name.
    #[error("ambiguous name {name}: {count} matching variables")]
    AmbiguousName { name: String, count: usize },

    /// The enclosing compound has no field with this name.
    #[error("{scope} has no field named {name}")]
    NoSuchField { scope: String, name: String },

    /// A field reference appeared under a scope that has no fields.
    #[error("{scope} is not a structure or sequence; cannot reference field {name}")]
    NotACompound { scope: String, name: String },

    // =========================================================================
    // Shape errors
    // =========================================================================
    /// A filter was attached to something other than a sequence.
    #[error("filter target {0} is not a sequence")]
    FilterTarget(String),

    /// A filter names a field that is missing, compound or dimensioned.
    #[error("illegal filter field {field} in {sequence}: {reason}")]
    FilterField {
        sequence: String,
        field: String,
        reason: String,
    },

    /// The filter tree nests deeper than the configured limit.
    #[error("filter nesting exceeds {0} levels")]
    FilterTooDeep(usize),

    // =========================================================================
    // Range errors
    // =========================================================================
    /// A slice violates `start <= stop`, `stride >= 1` or the dimension size.
    #[error("illegal slice {slice}: {reason}")]
    BadSlice { slice: String, reason: String },

    /// More index slices than the variable has dimensions.
    #[error("{var} has rank {rank} but {given} slices were given")]
    TooManySlices {
        var: String,
        rank: usize,
        given: usize,
    },

    /// A redefinition names no shared dimension.
    #[error("undefined dimension: {0}")]
    UnknownDimension(String),

    /// The same variable was referenced twice with different slices.
    #[error("conflicting slices for {0}")]
    ConflictingSlices(String),

    /// A projection selects more elements than allowed.
    #[error("projection of {var} selects {count} elements (max: {max})")]
    ProjectionTooLarge { var: String, count: u64, max: u64 },

    // =========================================================================
    // Evaluation errors
    // =========================================================================
    /// The row does not carry the filtered field.
    #[error("row has no value for field {0}")]
    MissingField(String),

    /// The row value for a filter field is not a scalar.
    #[error("row value for field {0} is not a scalar")]
    NotScalar(String),

    /// Operands cannot be compared.
    #[error("cannot compare {lhs} with {rhs}")]
    TypeMismatch { lhs: String, rhs: String },

    /// The filter result was not a boolean.
    #[error("filter evaluated to {0}, expected a boolean")]
    NotBoolean(String),

    /// A `~=` pattern failed to compile.
    #[error("bad pattern {pattern}: {reason}")]
    BadPattern { pattern: String, reason: String },

    /// Anything else wrong with a filter tree.
    #[error("malformed filter: {0}")]
    MalformedFilter(String),

    // =========================================================================
    // Lifecycle / syntax
    // =========================================================================
    /// The constraint was used in the wrong phase.
    #[error("invalid constraint state: {0}")]
    State(String),

    /// Constraint text did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CeError::UndefinedName(_)
            | CeError::AmbiguousName { .. }
            | CeError::NoSuchField { .. }
            | CeError::NotACompound { .. } => ErrorKind::Resolution,
            CeError::FilterTarget(_) | CeError::FilterField { .. } | CeError::FilterTooDeep(_) => {
                ErrorKind::Shape
            }
            CeError::BadSlice { .. }
            | CeError::TooManySlices { .. }
            | CeError::UnknownDimension(_)
            | CeError::ConflictingSlices(_)
            | CeError::ProjectionTooLarge { .. } => ErrorKind::Range,
            CeError::MissingField(_)
            | CeError::NotScalar(_)
            | CeError::TypeMismatch { .. }
            | CeError::NotBoolean(_)
            | CeError::BadPattern { .. }
            | CeError::MalformedFilter(_) => ErrorKind::Evaluation,
            CeError::State(_) => ErrorKind::State,
            CeError::Parse(_) => ErrorKind::Syntax,
        }
    }

    pub(crate) fn bad_slice(slice: impl ToString, reason: impl Into<String>) -> Self {
        CeError::BadSlice {
            slice: slice.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = CeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CeError::AmbiguousName {
            name: "/x".into(),
            count: 2,
        };
        assert!(err.to_string().contains("/x"));
        assert!(err.to_string().contains('2'));

        let err = CeError::ProjectionTooLarge {
            var: "/v".into(),
            count: 500,
            max: 100,
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(CeError::UndefinedName("a".into()).kind(), ErrorKind::Resolution);
        assert_eq!(CeError::FilterTarget("a".into()).kind(), ErrorKind::Shape);
        assert_eq!(CeError::UnknownDimension("d".into()).kind(), ErrorKind::Range);
        assert_eq!(CeError::NotBoolean("1".into()).kind(), ErrorKind::Evaluation);
        assert_eq!(CeError::State("sealed".into()).kind(), ErrorKind::State);
    }
}
