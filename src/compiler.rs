//! Constraint compiler: syntax tree to sealed [`Constraint`].
//!
//! ```text
//! CeAst ──► redefs ──► clauses (scope walk) ──► filters ──► expand + finish ──► limits
//! ```
//!
//! Name resolution: a reference outside any compound must be the FQN of
//! exactly one top-level variable; inside `{}` or after `.` it names a field
//! of the enclosing compound.

use std::sync::Arc;

use tracing::debug;

use crate::ast::{CeAst, CeExpr, Clause, Operator, SegmentTree};
use crate::config::CeConfig;
use crate::constraint::Constraint;
use crate::dmr::{Dmr, VarId, VarSort};
use crate::error::{CeError, Result};
use crate::filter::{build_pattern, Filter};
use crate::parser::parse_constraint;
use crate::value::Value;

/// Compiles constraint syntax trees against a schema.
#[derive(Debug, Clone, Default)]
pub struct CeCompiler {
    config: CeConfig,
}

impl CeCompiler {
    pub fn new(config: CeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CeConfig {
        &self.config
    }

    /// Compile `ast` into a finished view of `dmr`.
    pub fn compile(&self, dmr: &Arc<Dmr>, ast: &CeAst) -> Result<Constraint> {
        debug!(
            schema = dmr.name(),
            redefs = ast.redefs.len(),
            clauses = ast.clauses.len(),
            "compiling constraint"
        );
        let mut view = Constraint::new(Arc::clone(dmr));

        for redef in &ast.redefs {
            let dim = dmr
                .find_dimension(&redef.name)
                .ok_or_else(|| CeError::UnknownDimension(redef.name.clone()))?;
            let slice = redef.slice.finish(dmr.dimension(dim).size)?;
            view.add_redef(dim, slice)?;
        }

        for clause in &ast.clauses {
            self.compile_clause(&mut view, clause, None)?;
        }

        view.expand()?;
        view.finish()?;
        self.check_limits(&view)?;

        debug!(
            segments = view.segments().len(),
            dimensions = view.referenced_dimensions().len(),
            "constraint compiled"
        );
        Ok(view)
    }

    /// Parse and compile constraint text.
    pub fn compile_str(&self, dmr: &Arc<Dmr>, text: &str) -> Result<Constraint> {
        let ast = parse_constraint(text)?;
        self.compile(dmr, &ast)
    }

    fn compile_clause(
        &self,
        view: &mut Constraint,
        clause: &Clause,
        scope: Option<VarId>,
    ) -> Result<()> {
        let target = self.compile_segment(view, clause.projection(), scope)?;
        if let Clause::Selection { filter, .. } = clause {
            let dmr = Arc::clone(view.dmr());
            if dmr.variable(target).sort != VarSort::Sequence {
                return Err(CeError::FilterTarget(dmr.fqn(target)));
            }
            let filter = self.compile_filter(&dmr, target, filter, 1)?;
            view.set_filter(target, filter)?;
        }
        Ok(())
    }

    /// Register a segment tree; returns the variable at the end of its path.
    fn compile_segment(
        &self,
        view: &mut Constraint,
        tree: &SegmentTree,
        scope: Option<VarId>,
    ) -> Result<VarId> {
        let var = resolve(view.dmr(), &tree.name, scope)?;
        view.add_variable(var, tree.slices.clone())?;
        for field in &tree.fields {
            self.compile_clause(view, field, Some(var))?;
        }
        match &tree.path {
            Some(child) => self.compile_segment(view, child, Some(var)),
            None => Ok(var),
        }
    }

    /// Resolve filter names against `sequence` and put fields on the left.
    fn compile_filter(
        &self,
        dmr: &Dmr,
        sequence: VarId,
        expr: &CeExpr,
        depth: usize,
    ) -> Result<Filter> {
        if depth > self.config.max_filter_depth {
            return Err(CeError::FilterTooDeep(self.config.max_filter_depth));
        }
        let filter = match expr {
            CeExpr::Constant(value) => Filter::Constant(value.clone()),
            CeExpr::FieldRef(name) => filter_field(dmr, sequence, name)?,
            CeExpr::Compare { op, lhs, rhs } => {
                let lhs = self.compile_filter(dmr, sequence, lhs, depth + 1)?;
                let rhs = self.compile_filter(dmr, sequence, rhs, depth + 1)?;
                let swap =
                    !matches!(lhs, Filter::Field { .. }) && matches!(rhs, Filter::Field { .. });
                let (op, lhs, rhs) = if swap {
                    (op.flipped(), rhs, lhs)
                } else {
                    (*op, lhs, rhs)
                };
                let pattern = match (op, &rhs) {
                    (Operator::Req, Filter::Constant(Value::Str(p))) => {
                        Some(build_pattern(p, self.config.regex_size_limit)?)
                    }
                    _ => None,
                };
                Filter::Compare {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    pattern,
                }
            }
            CeExpr::And(a, b) => Filter::and(
                self.compile_filter(dmr, sequence, a, depth + 1)?,
                self.compile_filter(dmr, sequence, b, depth + 1)?,
            ),
            CeExpr::Not(inner) => {
                Filter::not(self.compile_filter(dmr, sequence, inner, depth + 1)?)
            }
        };
        Ok(filter)
    }

    fn check_limits(&self, view: &Constraint) -> Result<()> {
        let Some(max) = self.config.max_projection_elements else {
            return Ok(());
        };
        for segment in view.segments() {
            let count = segment.selected_count();
            if count > max {
                return Err(CeError::ProjectionTooLarge {
                    var: view.dmr().fqn(segment.variable()),
                    count,
                    max,
                });
            }
        }
        Ok(())
    }
}

fn resolve(dmr: &Dmr, name: &str, scope: Option<VarId>) -> Result<VarId> {
    match scope {
        None => {
            let found = dmr.find_variables(name);
            match found.as_slice() {
                [var] => Ok(*var),
                [] => Err(CeError::UndefinedName(name.to_string())),
                many => Err(CeError::AmbiguousName {
                    name: name.to_string(),
                    count: many.len(),
                }),
            }
        }
        Some(scope) => {
            if !dmr.variable(scope).sort.is_compound() {
                return Err(CeError::NotACompound {
                    scope: dmr.fqn(scope),
                    name: name.to_string(),
                });
            }
            dmr.field_by_name(scope, name)
                .ok_or_else(|| CeError::NoSuchField {
                    scope: dmr.fqn(scope),
                    name: name.to_string(),
                })
        }
    }
}

fn filter_field(dmr: &Dmr, sequence: VarId, name: &str) -> Result<Filter> {
    let illegal = |reason: &str| CeError::FilterField {
        sequence: dmr.fqn(sequence),
        field: name.to_string(),
        reason: reason.to_string(),
    };
    let var = dmr
        .field_by_name(sequence, name)
        .ok_or_else(|| illegal("no such field"))?;
    let v = dmr.variable(var);
    if !matches!(v.sort, VarSort::Atomic(_)) {
        return Err(illegal("not atomic"));
    }
    if v.rank() > 0 {
        return Err(illegal("not a scalar"));
    }
    Ok(Filter::Field {
        var,
        name: v.name.clone(),
    })
}

/// Compile with the default configuration.
pub fn compile(dmr: &Arc<Dmr>, ast: &CeAst) -> Result<Constraint> {
    CeCompiler::default().compile(dmr, ast)
}

/// Parse and compile with the default configuration.
pub fn compile_str(dmr: &Arc<Dmr>, text: &str) -> Result<Constraint> {
    CeCompiler::default().compile_str(dmr, text)
}
