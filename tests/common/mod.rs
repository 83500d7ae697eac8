//! Shared fixture schema for integration tests.
//!
//! ```text
//! /                      dims: time=10
//! ├── temp[time]         float32
//! ├── count              int32
//! ├── cast               sequence { depth, id, qc, profile[time] }
//! └── obs/               dims: n=4, enum quality
//!     ├── grid[time][n]  float64
//!     └── station[n]     structure { lat, lon, flag, meta { code, name } }
//! ```

#![allow(dead_code)]

use std::sync::{Arc, Once};

use dap4_ce::{AtomicType, DimId, Dmr, DmrBuilder, EnumId, VarId};

pub struct Ocean {
    pub dmr: Arc<Dmr>,
    pub time: DimId,
    pub n: DimId,
    pub quality: EnumId,
    pub temp: VarId,
    pub count: VarId,
    pub cast: VarId,
    pub depth: VarId,
    pub grid: VarId,
    pub station: VarId,
    pub lat: VarId,
    pub flag: VarId,
    pub meta: VarId,
}

pub fn ocean() -> Ocean {
    let mut b = DmrBuilder::new("ocean");
    let root = b.root();
    let obs = b.group(root, "obs");
    let time = b.dimension(root, "time", 10);
    let n = b.dimension(obs, "n", 4);
    let quality = b.enumeration(obs, "quality", AtomicType::UInt8, &[("good", 0), ("bad", 1)]);

    let temp = b.atomic(root, "temp", AtomicType::Float32, &[time]).unwrap();
    let count = b.atomic(root, "count", AtomicType::Int32, &[]).unwrap();

    let cast = b.sequence(root, "cast", &[]).unwrap();
    let depth = b.atomic(cast, "depth", AtomicType::Float64, &[]).unwrap();
    b.atomic(cast, "id", AtomicType::String, &[]).unwrap();
    b.atomic(cast, "qc", AtomicType::Int8, &[]).unwrap();
    b.atomic(cast, "profile", AtomicType::Int32, &[time]).unwrap();

    let grid = b.atomic(obs, "grid", AtomicType::Float64, &[time, n]).unwrap();
    let station = b.structure(obs, "station", &[n]).unwrap();
    let lat = b.atomic(station, "lat", AtomicType::Float64, &[]).unwrap();
    b.atomic(station, "lon", AtomicType::Float64, &[]).unwrap();
    let flag = b.atomic(station, "flag", AtomicType::Enum(quality), &[]).unwrap();
    let meta = b.structure(station, "meta", &[]).unwrap();
    b.atomic(meta, "code", AtomicType::Int32, &[]).unwrap();
    b.atomic(meta, "name", AtomicType::String, &[]).unwrap();

    Ocean {
        dmr: Arc::new(b.build()),
        time,
        n,
        quality,
        temp,
        count,
        cast,
        depth,
        grid,
        station,
        lat,
        flag,
        meta,
    }
}

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
