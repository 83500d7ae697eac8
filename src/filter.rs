//! Row filters for sequences
//!
//! A [`Filter`] is the compiled, name-resolved form of a `|` selection. The
//! compiler guarantees every field leaf is a scalar atomic field of the
//! filtered sequence and that comparisons read `field OP literal` whenever
//! one side is a field.
//!
//! Evaluation is a recursive tree walk against one [`Row`]; any shape or type
//! problem is an error rather than a silent `false`.

use std::cmp::Ordering;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::ast::Operator;
use crate::DEFAULT_REGEX_SIZE_LIMIT;
use crate::constraint::Constraint;
use crate::dmr::{Dmr, VarId, VarSort};
use crate::error::{CeError, Result};
use crate::parser::escape_name;
use crate::value::{Datum, Row, Value};

// ============================================================================
// Filter Tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Not,
}

/// Compiled filter node.
#[derive(Debug, Clone)]
pub enum Filter {
    Constant(Value),
    /// Scalar field of the filtered sequence.
    Field { var: VarId, name: String },
    Compare {
        op: Operator,
        lhs: Box<Filter>,
        rhs: Box<Filter>,
        /// Pre-built matcher when `op` is `~=` and the pattern is a constant.
        pattern: Option<Regex>,
    },
    Logical { op: LogicalOp, operands: Vec<Filter> },
}

impl Filter {
    pub fn and(lhs: Filter, rhs: Filter) -> Self {
        Filter::Logical {
            op: LogicalOp::And,
            operands: vec![lhs, rhs],
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Self {
        Filter::Logical {
            op: LogicalOp::Not,
            operands: vec![inner],
        }
    }

    /// Fields read by this filter, in first-use order.
    pub fn fields(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<VarId>) {
        match self {
            Filter::Constant(_) => {}
            Filter::Field { var, .. } => {
                if !out.contains(var) {
                    out.push(*var);
                }
            }
            Filter::Compare { lhs, rhs, .. } => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
            Filter::Logical { operands, .. } => {
                for operand in operands {
                    operand.collect_fields(out);
                }
            }
        }
    }

    /// Evaluate against one row.
    pub fn evaluate<R: Row + ?Sized>(&self, dmr: &Dmr, row: &R) -> Result<Value> {
        match self {
            Filter::Constant(value) => Ok(value.clone()),
            Filter::Field { var, name } => read_field(dmr, *var, name, row),
            Filter::Compare {
                op,
                lhs,
                rhs,
                pattern,
            } => {
                let lhs = lhs.evaluate(dmr, row)?;
                let rhs = rhs.evaluate(dmr, row)?;
                compare(*op, &lhs, &rhs, pattern.as_ref()).map(Value::Bool)
            }
            Filter::Logical { op, operands } => match (op, operands.as_slice()) {
                (LogicalOp::And, [a, b]) => {
                    let a = truth(a.evaluate(dmr, row)?)?;
                    let b = truth(b.evaluate(dmr, row)?)?;
                    Ok(Value::Bool(a && b))
                }
                (LogicalOp::Not, [a]) => Ok(Value::Bool(!truth(a.evaluate(dmr, row)?)?)),
                (op, operands) => Err(CeError::MalformedFilter(format!(
                    "{:?} with {} operands",
                    op,
                    operands.len()
                ))),
            },
        }
    }

    /// Evaluate and require a boolean result.
    pub fn matches<R: Row + ?Sized>(&self, dmr: &Dmr, row: &R) -> Result<bool> {
        truth(self.evaluate(dmr, row)?)
    }
}

/// Constraint-text form: `,` for and, `!` for not.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Constant(value) => write!(f, "{}", value),
            Filter::Field { name, .. } => f.write_str(&escape_name(name)),
            Filter::Compare { op, lhs, rhs, .. } => write!(f, "{}{}{}", lhs, op, rhs),
            Filter::Logical { op, operands } => match op {
                LogicalOp::And => {
                    let parts: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
                    f.write_str(&parts.join(","))
                }
                LogicalOp::Not => {
                    for operand in operands {
                        match operand {
                            Filter::Logical {
                                op: LogicalOp::And,
                                ..
                            } => write!(f, "!({})", operand)?,
                            _ => write!(f, "!{}", operand)?,
                        }
                    }
                    Ok(())
                }
            },
        }
    }
}

/// Compile a `~=` pattern; the whole left operand must match.
pub fn build_pattern(pattern: &str, size_limit: usize) -> Result<Regex> {
    RegexBuilder::new(&format!("^(?:{})$", pattern))
        .size_limit(size_limit)
        .build()
        .map_err(|e| CeError::BadPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

// ============================================================================
// Evaluation helpers
// ============================================================================

fn read_field<R: Row + ?Sized>(dmr: &Dmr, var: VarId, name: &str, row: &R) -> Result<Value> {
    let v = dmr.variable(var);
    if !matches!(v.sort, VarSort::Atomic(_)) || v.rank() > 0 {
        return Err(CeError::NotScalar(name.to_string()));
    }
    match row.field(name) {
        Some(Datum::Scalar(value)) => Ok(value.clone()),
        Some(_) => Err(CeError::NotScalar(name.to_string())),
        None => Err(CeError::MissingField(name.to_string())),
    }
}

fn truth(value: Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| CeError::NotBoolean(value.to_string()))
}

fn mismatch(lhs: &Value, rhs: &Value) -> CeError {
    CeError::TypeMismatch {
        lhs: format!("{} {}", lhs.type_name(), lhs),
        rhs: format!("{} {}", rhs.type_name(), rhs),
    }
}

fn widen_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

/// Compare two values with the promotion rules of the filter language.
pub fn compare(op: Operator, lhs: &Value, rhs: &Value, pattern: Option<&Regex>) -> Result<bool> {
    if op == Operator::Req {
        let text = lhs.as_text();
        return match pattern {
            Some(re) => Ok(re.is_match(&text)),
            None => Ok(build_pattern(&rhs.as_text(), DEFAULT_REGEX_SIZE_LIMIT)?.is_match(&text)),
        };
    }

    let ordering: Option<Ordering> = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            let a = widen_float(lhs).ok_or_else(|| mismatch(lhs, rhs))?;
            let b = widen_float(rhs).ok_or_else(|| mismatch(lhs, rhs))?;
            a.partial_cmp(&b)
        }
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => return Err(mismatch(lhs, rhs)),
    };

    // Unordered (NaN) operands satisfy only `!=`.
    Ok(match ordering {
        None => op == Operator::Ne,
        Some(ord) => match op {
            Operator::Lt => ord == Ordering::Less,
            Operator::Le => ord != Ordering::Greater,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Ge => ord != Ordering::Less,
            Operator::Eq => ord == Ordering::Equal,
            Operator::Ne => ord != Ordering::Equal,
            Operator::Req => unreachable!("handled above"),
        },
    })
}

// ============================================================================
// Filter Iterator
// ============================================================================

/// Yields only the rows of a sequence that pass its filter.
///
/// Reads ahead at most one row: [`FilterIterator::has_next`] scans to the
/// next match and buffers it until [`FilterIterator::next_matched`] (or
/// `Iterator::next`) hands it out. The row source is not touched again once
/// the consumer stops asking.
pub struct FilterIterator<'c, I>
where
    I: Iterator,
    I::Item: Row,
{
    constraint: &'c Constraint,
    sequence: VarId,
    rows: I,
    pending: Option<I::Item>,
    exhausted: bool,
}

impl<'c, I> FilterIterator<'c, I>
where
    I: Iterator,
    I::Item: Row,
{
    pub(crate) fn new(constraint: &'c Constraint, sequence: VarId, rows: I) -> Self {
        Self {
            constraint,
            sequence,
            rows,
            pending: None,
            exhausted: false,
        }
    }

    /// Advance to the next matching row, if any.
    pub fn has_next(&mut self) -> Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        if self.exhausted {
            return Ok(false);
        }
        while let Some(row) = self.rows.next() {
            if self.constraint.match_row(self.sequence, &row)? {
                self.pending = Some(row);
                return Ok(true);
            }
        }
        self.exhausted = true;
        Ok(false)
    }

    /// Take the row found by the last successful [`has_next`](Self::has_next).
    pub fn next_matched(&mut self) -> Result<I::Item> {
        self.pending.take().ok_or_else(|| {
            CeError::State("next_matched called without a successful has_next".to_string())
        })
    }
}

impl<I> Iterator for FilterIterator<'_, I>
where
    I: Iterator,
    I::Item: Row,
{
    type Item = Result<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => self.pending.take().map(Ok),
            Ok(false) => None,
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmr::{AtomicType, DmrBuilder};
    use crate::value::MemoryRow;

    fn schema() -> (Dmr, VarId, VarId, VarId) {
        let mut b = DmrBuilder::new("cast");
        let root = b.root();
        let n = b.dimension(root, "n", 3);
        let seq = b.sequence(root, "cast", &[]).unwrap();
        let depth = b.atomic(seq, "depth", AtomicType::Float64, &[]).unwrap();
        let id = b.atomic(seq, "id", AtomicType::String, &[]).unwrap();
        let profile = b.atomic(seq, "profile", AtomicType::Int32, &[n]).unwrap();
        (b.build(), depth, id, profile)
    }

    fn field(var: VarId, name: &str) -> Filter {
        Filter::Field {
            var,
            name: name.to_string(),
        }
    }

    fn cmp(op: Operator, lhs: Filter, rhs: Filter) -> Filter {
        Filter::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            pattern: None,
        }
    }

    #[test]
    fn test_compare_promotion() {
        assert!(compare(Operator::Lt, &Value::Int(1), &Value::Float(1.5), None).unwrap());
        assert!(compare(Operator::Eq, &Value::Int(2), &Value::Float(2.0), None).unwrap());
        assert!(compare(Operator::Gt, &Value::from("b"), &Value::from("a"), None).unwrap());
        assert!(compare(Operator::Lt, &Value::Bool(false), &Value::Bool(true), None).unwrap());
        assert!(compare(Operator::Ne, &Value::Int(3), &Value::Int(4), None).unwrap());
        assert!(compare(Operator::Lt, &Value::from("a"), &Value::Int(1), None).is_err());
        assert!(compare(Operator::Eq, &Value::Bool(true), &Value::Int(1), None).is_err());
    }

    #[test]
    fn test_nan_is_unordered() {
        let nan = Value::Float(f64::NAN);
        assert!(!compare(Operator::Eq, &nan, &nan, None).unwrap());
        assert!(compare(Operator::Ne, &nan, &nan, None).unwrap());
        assert!(!compare(Operator::Lt, &nan, &Value::Int(0), None).unwrap());
    }

    #[test]
    fn test_regex_match() {
        assert!(compare(Operator::Req, &Value::from("abc"), &Value::from("a.c"), None).unwrap());
        assert!(!compare(Operator::Req, &Value::from("xabc"), &Value::from("a.c"), None).unwrap());
        assert!(compare(Operator::Req, &Value::Int(42), &Value::from("4[0-9]"), None).unwrap());
        assert!(compare(Operator::Req, &Value::from("a"), &Value::from("("), None).is_err());
    }

    #[test]
    fn test_range_filter() {
        let (dmr, depth, _, _) = schema();
        let filter = Filter::and(
            cmp(Operator::Ge, field(depth, "depth"), Filter::Constant(Value::Int(100))),
            cmp(Operator::Lt, field(depth, "depth"), Filter::Constant(Value::Int(200))),
        );
        let results: Vec<bool> = [50.0, 100.0, 150.0, 200.0]
            .iter()
            .map(|d| filter.matches(&dmr, &MemoryRow::new().with("depth", *d)).unwrap())
            .collect();
        assert_eq!(results, vec![false, true, true, false]);
        assert_eq!(filter.to_string(), "depth>=100,depth<200");
    }

    #[test]
    fn test_missing_and_non_scalar_fields() {
        let (dmr, depth, _, profile) = schema();
        let filter = cmp(Operator::Gt, field(depth, "depth"), Filter::Constant(Value::Int(1)));
        let err = filter.matches(&dmr, &MemoryRow::new()).unwrap_err();
        assert!(matches!(err, CeError::MissingField(_)));

        let filter = cmp(Operator::Gt, field(profile, "profile"), Filter::Constant(Value::Int(1)));
        let row = MemoryRow::new().with("profile", 3i64);
        assert!(matches!(filter.matches(&dmr, &row), Err(CeError::NotScalar(_))));
    }

    #[test]
    fn test_not_boolean_and_malformed() {
        let (dmr, _, _, _) = schema();
        let row = MemoryRow::new();
        let constant = Filter::Constant(Value::Int(1));
        assert!(matches!(constant.matches(&dmr, &row), Err(CeError::NotBoolean(_))));

        let broken = Filter::Logical {
            op: LogicalOp::And,
            operands: vec![Filter::Constant(Value::Bool(true))],
        };
        assert!(matches!(broken.matches(&dmr, &row), Err(CeError::MalformedFilter(_))));
    }

    #[test]
    fn test_display_not() {
        let (_, depth, id, _) = schema();
        let inner = Filter::and(
            cmp(Operator::Gt, field(depth, "depth"), Filter::Constant(Value::Float(1.0))),
            cmp(Operator::Req, field(id, "id"), Filter::Constant(Value::from("a.*"))),
        );
        assert_eq!(Filter::not(inner).to_string(), r#"!(depth>1.0,id~="a.*")"#);
    }

    #[test]
    fn test_fields_in_order() {
        let (_, depth, id, _) = schema();
        let filter = Filter::and(
            cmp(Operator::Eq, field(id, "id"), Filter::Constant(Value::from("x"))),
            cmp(Operator::Gt, field(depth, "depth"), field(id, "id")),
        );
        assert_eq!(filter.fields(), vec![id, depth]);
    }
}
