/// Data layer: record model, normalization, caching, querying and aggregation.
///
/// Architecture:
/// ```text
///  vasprun.xml                 .parquet / .pq
///       │                            │
///       ▼                            │
///   ┌──────────┐                     │
///   │ vasprun  │  raw arrays         │
///   └──────────┘                     │
///       │                            │
///       ▼                            ▼
///   ┌───────────┐              ┌──────────┐
///   │ normalize │  ── Table ── │  cache   │  save / load
///   └───────────┘              └──────────┘
///        │
///        ▼
///   ┌──────────────────────┐
///   │ filter / aggregate    │  query, band windows, orbital & ion shares
///   └──────────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export  │  csv / json / parquet
///   └──────────┘
/// ```

pub mod aggregate;
pub mod cache;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod orbital;
pub mod vasprun;
