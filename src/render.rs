//! Constraint text rendering.
//!
//! The inverse of expansion: a compound whose every field is selected whole
//! is printed by name alone, anything else gets an explicit `{f;g}` list.
//!
//! ```text
//! /d=[0:4];/grid[0:2:4][];/obs/station{lat};/cast|depth>=100,depth<200
//! ```

use std::collections::{HashMap, HashSet};

use url::form_urlencoded;

use crate::constraint::{Constraint, Segment};
use crate::dmr::VarId;
use crate::error::Result;
use crate::parser::escape_name;

impl Constraint {
    /// Compounds of this view that are selected whole.
    ///
    /// A compound is whole when every schema field is referenced with only
    /// unconstrained slices and no filter, and every compound field is whole
    /// itself. A constrained slice counts as a restriction even when it
    /// covers the full extent.
    pub fn contract(&self) -> HashSet<VarId> {
        let mut memo = HashMap::new();
        for var in self.variables() {
            self.is_whole(*var, &mut memo);
        }
        memo.into_iter()
            .filter(|(var, whole)| *whole && self.dmr().variable(*var).sort.is_compound())
            .map(|(var, _)| var)
            .collect()
    }

    fn is_whole(&self, var: VarId, memo: &mut HashMap<VarId, bool>) -> bool {
        if let Some(known) = memo.get(&var) {
            return *known;
        }
        let dmr = self.dmr();
        let whole = dmr.variable(var).fields.iter().all(|field| match self.segment(*field) {
            None => false,
            Some(seg) => {
                seg.filter().is_none()
                    && seg.slices().iter().all(|s| !s.constrained)
                    && self.is_whole(*field, memo)
            }
        });
        memo.insert(var, whole);
        whole
    }

    /// Normalized constraint expression that compiles back to this view.
    pub fn to_constraint_string(&self) -> Result<String> {
        self.ensure_finished("to_constraint_string")?;
        let dmr = self.dmr();
        let whole = self.contract();

        let mut clauses: Vec<String> = self
            .redefinitions()
            .iter()
            .filter_map(|(dim, slice)| {
                dmr.dim_fqn(*dim).map(|name| {
                    format!("{}={}", escape_name(&name), slice.to_constraint_string())
                })
            })
            .collect();

        for seg in self.segments() {
            if dmr.variable(seg.variable()).is_top_level() {
                clauses.push(self.render_segment(seg, &whole));
            }
        }
        Ok(clauses.join(";"))
    }

    /// [`to_constraint_string`](Self::to_constraint_string), percent-encoded
    /// for a URL query value.
    pub fn to_query_string(&self) -> Result<String> {
        let text = self.to_constraint_string()?;
        Ok(form_urlencoded::byte_serialize(text.as_bytes()).collect())
    }

    fn render_segment(&self, seg: &Segment, whole: &HashSet<VarId>) -> String {
        let dmr = self.dmr();
        let var = dmr.variable(seg.variable());
        let mut out = if var.is_top_level() {
            escape_name(&dmr.fqn(seg.variable()))
        } else {
            escape_name(&var.name)
        };

        if seg.slices().iter().any(|s| s.constrained) {
            for slice in seg.slices() {
                out.push_str(&slice.to_constraint_string());
            }
        }

        if var.sort.is_compound() && !whole.contains(&seg.variable()) {
            let fields: Vec<String> = var
                .fields
                .iter()
                .filter_map(|f| self.segment(*f))
                .map(|f| self.render_segment(f, whole))
                .collect();
            // A nested compound named without fields prints bare.
            if !fields.is_empty() {
                out.push('{');
                out.push_str(&fields.join(";"));
                out.push('}');
            }
        }

        if let Some(filter) = seg.filter() {
            out.push('|');
            out.push_str(&filter.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dmr::{AtomicType, DmrBuilder};
    use crate::slice::Slice;
    use pretty_assertions::assert_eq;

    fn station_schema() -> (Arc<crate::dmr::Dmr>, VarId, [VarId; 3]) {
        let mut b = DmrBuilder::new("stations");
        let root = b.root();
        let s = b.structure(root, "station", &[]).unwrap();
        let a = b.atomic(s, "a", AtomicType::Int32, &[]).unwrap();
        let c = b.atomic(s, "b", AtomicType::Int32, &[]).unwrap();
        let d = b.atomic(s, "c", AtomicType::Int32, &[]).unwrap();
        (Arc::new(b.build()), s, [a, c, d])
    }

    #[test]
    fn test_whole_structure_prints_bare_name() {
        let (dmr, s, fields) = station_schema();
        let mut view = Constraint::new(dmr);
        for f in fields {
            view.add_variable(f, Vec::new()).unwrap();
        }
        view.finish().unwrap();
        assert!(view.contract().contains(&s));
        assert_eq!(view.to_constraint_string().unwrap(), "/station");
    }

    #[test]
    fn test_partial_structure_lists_fields() {
        let (dmr, s, fields) = station_schema();
        let mut view = Constraint::new(dmr);
        view.add_variable(fields[1], Vec::new()).unwrap();
        view.add_variable(fields[0], Vec::new()).unwrap();
        view.finish().unwrap();
        assert!(!view.contract().contains(&s));
        assert_eq!(view.to_constraint_string().unwrap(), "/station{a;b}");
    }

    #[test]
    fn test_slices_and_redefs_render() {
        let mut b = DmrBuilder::new("grid");
        let root = b.root();
        let d = b.dimension(root, "d", 10);
        let e = b.dimension(root, "e", 4);
        let grid = b.atomic(root, "grid", AtomicType::Float32, &[d, e]).unwrap();
        let dmr = Arc::new(b.build());

        let mut view = Constraint::new(dmr);
        view.add_redef(d, Slice::range(0, 1, Some(4))).unwrap();
        view.add_variable(grid, vec![Slice::whole(), Slice::range(0, 2, None)]).unwrap();
        view.finish().unwrap();
        assert_eq!(view.to_constraint_string().unwrap(), "/d=[0:4];/grid[][0:2:2]");
        assert_eq!(
            view.to_query_string().unwrap(),
            "%2Fd%3D%5B0%3A4%5D%3B%2Fgrid%5B%5D%5B0%3A2%3A2%5D"
        );
    }

    #[test]
    fn test_render_requires_finish() {
        let (dmr, _, _) = station_schema();
        let view = Constraint::new(dmr);
        assert!(view.to_constraint_string().is_err());
    }
}
