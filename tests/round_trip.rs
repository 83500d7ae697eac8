//! Rendering a compiled view and compiling the text again selects the same data.

mod common;

use common::{init_tracing, ocean};
use dap4_ce::{compile_str, Constraint};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Redefinitions, then per variable: FQN, selected indices per position, filter text.
type Fingerprint = (
    Vec<(String, String)>,
    Vec<(String, Vec<Vec<u64>>, Option<String>)>,
);

fn fingerprint(view: &Constraint) -> Fingerprint {
    let dmr = view.dmr();
    let redefs: Vec<(String, String)> = view
        .redefinitions()
        .iter()
        .map(|(d, s)| (dmr.dim_fqn(*d).unwrap_or_default(), s.to_constraint_string()))
        .collect();
    let mut segments: Vec<(String, Vec<Vec<u64>>, Option<String>)> = view
        .segments()
        .iter()
        .map(|s| {
            (
                dmr.fqn(s.variable()),
                s.projection_slices()
                    .iter()
                    .map(|p| p.indices().collect())
                    .collect(),
                s.filter().map(|f| f.to_string()),
            )
        })
        .collect();
    segments.sort_by(|a, b| a.0.cmp(&b.0));
    (redefs, segments)
}

fn assert_round_trip(text: &str) -> String {
    let fx = ocean();
    let first = compile_str(&fx.dmr, text).unwrap();
    let rendered = first.to_constraint_string().unwrap();
    let second = compile_str(&fx.dmr, &rendered)
        .unwrap_or_else(|e| panic!("re-compiling {:?} (from {:?}) failed: {}", rendered, text, e));
    assert_eq!(fingerprint(&first), fingerprint(&second), "round trip of {:?}", text);
    rendered
}

#[test]
fn round_trips_preserve_selection() {
    init_tracing();
    let cases = [
        "temp",
        "count;temp[0:2:8]",
        "/time=[0:4];temp;/obs/grid[1:2:3][]",
        "/obs/n=[1:3];/obs/station{lon}",
        "/obs/station{lat;meta.code}",
        "/obs/station[1:2]{flag}",
        "/obs/station.meta{name}",
        "/obs/station{lat;meta}",
        "/obs/station.meta",
        "cast{depth;id}|depth>=100,depth<200",
        r#"cast|!(id~="x.*",qc!=3)"#,
        "cast|1<depth<=5.5",
        "cast|depth<1e300,depth>-2.5e-300",
        r#"cast|"a\"b"==id"#,
        "temp[3:];/obs/grid[][1:2:]",
    ];
    for case in cases {
        assert_round_trip(case);
    }
}

#[test]
fn whole_structures_contract() {
    assert_eq!(assert_round_trip("/obs/station"), "/obs/station");
    assert_eq!(
        assert_round_trip("/obs/station{lon;lat}"),
        "/obs/station{lat;lon}"
    );
    assert_eq!(
        assert_round_trip("/obs/station{lat;meta.code}"),
        "/obs/station{lat;meta{code}}"
    );
    assert_eq!(assert_round_trip("/obs/station{meta;lat}"), "/obs/station{lat;meta}");
}

#[test]
fn rendering_is_normalized() {
    assert_eq!(assert_round_trip("cast|5<depth"), "/cast|depth>5");
    assert_eq!(
        assert_round_trip("/time=[0:4]; temp ; /obs/grid[1][]"),
        "/time=[0:4];/temp;/obs/grid[1][]"
    );
    assert_eq!(assert_round_trip("count;temp"), "/count;/temp");
}

#[test]
fn overflowing_literals_do_not_compile() {
    let fx = ocean();
    for text in ["cast|depth<1e999", "cast|depth>-1e999", "cast|qc<99999999999999999999"] {
        let err = compile_str(&fx.dmr, text).unwrap_err();
        assert_eq!(err.kind(), dap4_ce::ErrorKind::Syntax, "{}", text);
    }
}

#[test]
fn query_string_decodes_to_constraint() {
    let fx = ocean();
    let view = compile_str(&fx.dmr, r#"cast{id}|id=="a b""#).unwrap();
    let text = view.to_constraint_string().unwrap();
    let query = view.to_query_string().unwrap();
    assert!(!query.contains('"'));
    assert!(!query.contains(';') && !query.contains('|'));

    let encoded = format!("ce={}", query);
    let decoded: Vec<(String, String)> = url::form_urlencoded::parse(encoded.as_bytes())
        .into_owned()
        .collect();
    assert_eq!(decoded, vec![("ce".to_string(), text)]);
}

proptest! {
    #[test]
    fn sliced_projections_round_trip(
        start in 0u64..10,
        stride in 1u64..4,
        len in 0u64..10,
        open in any::<bool>(),
    ) {
        let last = (start + len).min(9);
        let text = if open {
            format!("temp[{}:{}:];/obs/grid[][{}]", start, stride, start % 4)
        } else {
            format!("temp[{}:{}:{}];/obs/grid[][{}]", start, stride, last, start % 4)
        };
        let fx = ocean();
        let first = compile_str(&fx.dmr, &text).unwrap();
        let second = compile_str(&fx.dmr, &first.to_constraint_string().unwrap()).unwrap();
        prop_assert_eq!(fingerprint(&first), fingerprint(&second));
        prop_assert_eq!(first.selected_count(fx.temp), second.selected_count(fx.temp));
    }
}
