use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Orbital – a raw orbital channel or a named composite
// ---------------------------------------------------------------------------

/// Orbital column value.
///
/// Raw records carry the channel index reported by the calculation. Derived
/// rows produced by a composite sum carry the composite's label instead, so
/// both kinds can sit side by side in one [`Table`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Orbital {
    Index(u32),
    Composite(String),
}

impl Orbital {
    pub fn index(&self) -> Option<u32> {
        match self {
            Orbital::Index(i) => Some(*i),
            Orbital::Composite(_) => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Orbital::Composite(_))
    }
}

impl fmt::Display for Orbital {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orbital::Index(i) => write!(f, "{i}"),
            Orbital::Composite(label) => write!(f, "{label}"),
        }
    }
}

impl FromStr for Orbital {
    type Err = EngineError;

    /// Digits parse as a channel index, anything else as a composite label.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EngineError::UnknownOrbital(s.to_string()));
        }
        match s.parse::<u32>() {
            Ok(i) => Ok(Orbital::Index(i)),
            Err(_) => Ok(Orbital::Composite(s.to_string())),
        }
    }
}

impl From<u32> for Orbital {
    fn from(i: u32) -> Self {
        Orbital::Index(i)
    }
}

// ---------------------------------------------------------------------------
// Record – one projection weight with its band energy
// ---------------------------------------------------------------------------

/// Identity of a [`Record`] within a table.
///
/// `ion` is `None` for rows that were summed over ions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub spin: u32,
    pub kpoint: u32,
    pub band: u32,
    pub ion: Option<u32>,
    pub orbital: Orbital,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(spin {}, kpoint {}, band {}, ion ",
            self.spin, self.kpoint, self.band
        )?;
        match self.ion {
            Some(ion) => write!(f, "{ion}")?,
            None => write!(f, "<all>")?,
        }
        write!(f, ", orbital {})", self.orbital)
    }
}

/// A single row of the normalized table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub spin: u32,
    pub kpoint: u32,
    pub band: u32,
    pub ion: Option<u32>,
    pub orbital: Orbital,
    /// Band energy in eV, shared by every record of the same (spin, kpoint, band).
    pub energy: f64,
    pub occupation: f64,
    /// Projection weight.
    pub value: f64,
}

impl Record {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            spin: self.spin,
            kpoint: self.kpoint,
            band: self.band,
            ion: self.ion,
            orbital: self.orbital.clone(),
        }
    }

    /// The (spin, kpoint, band) triple that carries energy and occupation.
    pub fn state(&self) -> (u32, u32, u32) {
        (self.spin, self.kpoint, self.band)
    }
}

fn same_float(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

// ---------------------------------------------------------------------------
// Table – an owned, validated set of records
// ---------------------------------------------------------------------------

/// Distinct-value counts per key column, as reported by `--describe`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub records: usize,
    pub spins: usize,
    pub kpoints: usize,
    pub bands: usize,
    pub ions: usize,
    pub orbitals: usize,
}

/// An unordered collection of records with unique keys.
///
/// Every record sharing a (spin, kpoint, band) triple carries the same energy
/// and occupation. Operations never mutate a table in place; they hand back a
/// new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    records: Vec<Record>,
}

impl Table {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table, checking key uniqueness and the shared-energy invariant.
    pub fn try_from_records(records: Vec<Record>) -> Result<Self> {
        let mut keys: BTreeSet<RecordKey> = BTreeSet::new();
        let mut states: BTreeMap<(u32, u32, u32), (f64, f64)> = BTreeMap::new();

        for rec in &records {
            let key = rec.key();
            if !keys.insert(key.clone()) {
                return Err(EngineError::InvalidTable(format!(
                    "duplicate record key {key}"
                )));
            }
            let (energy, occupation) = *states
                .entry(rec.state())
                .or_insert((rec.energy, rec.occupation));
            if !same_float(energy, rec.energy) || !same_float(occupation, rec.occupation) {
                return Err(EngineError::InvalidTable(format!(
                    "record {key} has energy/occupation ({}, {}) but its band state has ({energy}, {occupation})",
                    rec.energy, rec.occupation
                )));
            }
        }

        Ok(Self { records })
    }

    /// Wrap records already known to satisfy the table invariants, e.g. a
    /// subset of an existing table.
    pub(crate) fn from_trusted(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the table sorted by (spin, kpoint, band, ion, orbital).
    pub fn sorted(&self) -> Table {
        let mut records = self.records.clone();
        records.sort_by_cached_key(Record::key);
        Table { records }
    }

    /// Subset of records matching `keep`.
    pub fn select(&self, keep: impl Fn(&Record) -> bool) -> Table {
        Table::from_trusted(self.records.iter().filter(|r| keep(r)).cloned().collect())
    }

    pub fn distinct_kpoints(&self) -> BTreeSet<u32> {
        self.records.iter().map(|r| r.kpoint).collect()
    }

    pub fn distinct_bands(&self) -> BTreeSet<u32> {
        self.records.iter().map(|r| r.band).collect()
    }

    /// Count distinct values of each key column. Ion-summed rows do not count
    /// towards the ion total.
    pub fn summary(&self) -> TableSummary {
        let mut spins = BTreeSet::new();
        let mut kpoints = BTreeSet::new();
        let mut bands = BTreeSet::new();
        let mut ions = BTreeSet::new();
        let mut orbitals = BTreeSet::new();
        for r in &self.records {
            spins.insert(r.spin);
            kpoints.insert(r.kpoint);
            bands.insert(r.band);
            if let Some(ion) = r.ion {
                ions.insert(ion);
            }
            orbitals.insert(&r.orbital);
        }
        TableSummary {
            records: self.records.len(),
            spins: spins.len(),
            kpoints: kpoints.len(),
            bands: bands.len(),
            ions: ions.len(),
            orbitals: orbitals.len(),
        }
    }

    /// Copy of the table with every energy referenced to `reference`
    /// (typically the Fermi level).
    pub fn shift_energy(&self, reference: f64) -> Table {
        Table::from_trusted(
            self.records
                .iter()
                .map(|r| Record {
                    energy: r.energy - reference,
                    ..r.clone()
                })
                .collect(),
        )
    }

    /// Order-independent equality of the two record sets.
    pub fn same_records(&self, other: &Table) -> bool {
        self.len() == other.len() && self.sorted().records == other.sorted().records
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
