//! Query engine for projected electronic-structure data.
//!
//! Raw per-(spin, kpoint, band) eigenvalues and per-(spin, kpoint, band, ion,
//! orbital) projection weights are flattened into a [`Table`] of [`Record`]s,
//! which can be cached to Parquet, filtered with a [`Query`] or band windows,
//! and aggregated into orbital character, ion composition and charge spilling.
//!
//! ```
//! use rusty_procar::{normalize, query, EigenArray, ProjectionArray, Query};
//!
//! let eigenvalues = EigenArray::from_nested(vec![vec![vec![(-1.0, 1.0)], vec![(-0.8, 1.0)]]])?;
//! let projections = ProjectionArray::from_nested(vec![vec![
//!     vec![vec![vec![0.6, 0.3]]],
//!     vec![vec![vec![0.5, 0.4]]],
//! ]])?;
//!
//! let table = normalize(&eigenvalues, &projections)?;
//! assert_eq!(table.len(), 4);
//!
//! let at_gamma = query(&table, &Query::new().kpoint(0))?;
//! assert_eq!(at_gamma.len(), 2);
//! # Ok::<(), rusty_procar::EngineError>(())
//! ```

pub mod data;
pub mod error;

pub use data::aggregate::{
    charge_spilling, collapse_ions, ion_composition, normalized_shares, orbital_percentages,
    orbital_variation, with_orbital_sum, ChargeSpilling, IonKey, OrbitalKey, Share,
};
pub use data::filter::{
    band_series, filter_bands_by_energy, filter_bands_by_index, query, BandPoint, EnergyPredicate,
    Query,
};
pub use data::loader::{load_table, source_kind, SourceKind};
pub use data::model::{Orbital, Record, RecordKey, Table, TableSummary};
pub use data::normalize::{normalize, EigenArray, ProjectionArray};
pub use data::orbital::OrbitalGroup;
pub use error::{EngineError, Result};
