use std::collections::{BTreeMap, BTreeSet};

use super::model::{Orbital, Record, Table};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Query predicates
// ---------------------------------------------------------------------------

/// Energy constraint of a [`Query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnergyPredicate {
    Equals(f64),
    /// Inclusive window.
    Within { min: f64, max: f64 },
}

impl EnergyPredicate {
    fn matches(&self, energy: f64) -> bool {
        match *self {
            EnergyPredicate::Equals(e) => energy == e,
            EnergyPredicate::Within { min, max } => energy >= min && energy <= max,
        }
    }
}

/// A conjunction of optional predicates over the record columns.
///
/// An absent field places no constraint. `ions` is a set-membership test;
/// an empty ion list also places no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub spin: Option<u32>,
    pub kpoint: Option<u32>,
    pub band: Option<u32>,
    pub ions: Option<Vec<u32>>,
    pub orbital: Option<Orbital>,
    pub occupation: Option<f64>,
    pub energy: Option<EnergyPredicate>,
    /// Subtracted from every energy before the energy predicate is evaluated.
    pub energy_reference: Option<f64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spin(mut self, spin: u32) -> Self {
        self.spin = Some(spin);
        self
    }

    pub fn kpoint(mut self, kpoint: u32) -> Self {
        self.kpoint = Some(kpoint);
        self
    }

    pub fn band(mut self, band: u32) -> Self {
        self.band = Some(band);
        self
    }

    pub fn ions(mut self, ions: impl IntoIterator<Item = u32>) -> Self {
        self.ions = Some(ions.into_iter().collect());
        self
    }

    pub fn orbital(mut self, orbital: impl Into<Orbital>) -> Self {
        self.orbital = Some(orbital.into());
        self
    }

    pub fn occupation(mut self, occupation: f64) -> Self {
        self.occupation = Some(occupation);
        self
    }

    pub fn energy(mut self, energy: f64) -> Self {
        self.energy = Some(EnergyPredicate::Equals(energy));
        self
    }

    pub fn energy_within(mut self, min: f64, max: f64) -> Self {
        self.energy = Some(EnergyPredicate::Within { min, max });
        self
    }

    pub fn energy_reference(mut self, reference: f64) -> Self {
        self.energy_reference = Some(reference);
        self
    }

    /// Reject predicate combinations that can never be meaningful.
    pub fn validate(&self) -> Result<()> {
        if let Some(EnergyPredicate::Within { min, max }) = self.energy {
            check_window("energy", min, max)?;
        }
        if let Some(EnergyPredicate::Equals(e)) = self.energy {
            if e.is_nan() {
                return Err(EngineError::InvalidPredicateCombination(
                    "energy must be a number".into(),
                ));
            }
        }
        if self.energy_reference.is_some_and(|r| !r.is_finite()) {
            return Err(EngineError::InvalidPredicateCombination(
                "energy reference must be finite".into(),
            ));
        }
        Ok(())
    }

    fn ion_set(&self) -> Option<BTreeSet<u32>> {
        self.ions
            .as_ref()
            .filter(|ions| !ions.is_empty())
            .map(|ions| ions.iter().copied().collect())
    }

    /// `energy` is the record energy after any reference shift.
    fn matches(&self, rec: &Record, energy: f64, ions: Option<&BTreeSet<u32>>) -> bool {
        self.spin.map_or(true, |s| rec.spin == s)
            && self.kpoint.map_or(true, |k| rec.kpoint == k)
            && self.band.map_or(true, |b| rec.band == b)
            && ions.map_or(true, |set| rec.ion.is_some_and(|i| set.contains(&i)))
            && self.orbital.as_ref().map_or(true, |o| &rec.orbital == o)
            && self.occupation.map_or(true, |occ| rec.occupation == occ)
            && self.energy.map_or(true, |p| p.matches(energy))
    }
}

/// Return the records of `table` that satisfy every predicate of `query`.
///
/// When an energy reference is set, the returned records carry the shifted
/// energies; `table` itself is never modified. No match yields an empty table.
pub fn query(table: &Table, query: &Query) -> Result<Table> {
    query.validate()?;
    let reference = query.energy_reference.unwrap_or(0.0);
    let ions = query.ion_set();

    let records: Vec<Record> = table
        .iter()
        .filter_map(|rec| {
            let energy = rec.energy - reference;
            query.matches(rec, energy, ions.as_ref()).then(|| Record {
                energy,
                ..rec.clone()
            })
        })
        .collect();
    log::debug!("Query matched {} of {} records", records.len(), table.len());

    Ok(Table::from_trusted(records))
}

// ---------------------------------------------------------------------------
// Band filters
// ---------------------------------------------------------------------------

fn check_window<T: PartialOrd + std::fmt::Display>(what: &str, min: T, max: T) -> Result<()> {
    if min > max {
        return Err(EngineError::InvalidPredicateCombination(format!(
            "{what} window minimum {min} exceeds maximum {max}"
        )));
    }
    // Catches NaN bounds, which compare false both ways.
    if min.partial_cmp(&max).is_none() {
        return Err(EngineError::InvalidPredicateCombination(format!(
            "{what} window [{min}, {max}] is not ordered"
        )));
    }
    Ok(())
}

/// Keep the bands that stay inside `[emin, emax]` along the whole k-path.
///
/// Records outside the window are dropped first. A band survives when it
/// still has a record at every k-point that has any record left in the
/// window; spin channels of a band are counted together.
pub fn filter_bands_by_energy(table: &Table, emin: f64, emax: f64) -> Result<Table> {
    check_window("energy", emin, emax)?;

    let windowed: Vec<&Record> = table
        .iter()
        .filter(|r| r.energy >= emin && r.energy <= emax)
        .collect();
    let nkpoints = windowed.iter().map(|r| r.kpoint).collect::<BTreeSet<_>>().len();

    let mut coverage: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for r in &windowed {
        coverage.entry(r.band).or_default().insert(r.kpoint);
    }
    let complete: BTreeSet<u32> = coverage
        .into_iter()
        .filter(|(_, kpoints)| kpoints.len() == nkpoints)
        .map(|(band, _)| band)
        .collect();

    let records: Vec<Record> = windowed
        .into_iter()
        .filter(|r| complete.contains(&r.band))
        .cloned()
        .collect();
    log::debug!(
        "Energy window [{emin}, {emax}] kept {} complete bands over {nkpoints} k-points ({} records)",
        complete.len(),
        records.len()
    );

    Ok(Table::from_trusted(records))
}

/// Keep the bands whose index lies in `[imin, imax]`.
pub fn filter_bands_by_index(table: &Table, imin: u32, imax: u32) -> Result<Table> {
    check_window("band index", imin, imax)?;
    Ok(table.select(|r| r.band >= imin && r.band <= imax))
}

// ---------------------------------------------------------------------------
// Band series
// ---------------------------------------------------------------------------

/// One point of a band line: the energy of a band at a k-point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BandPoint {
    pub spin: u32,
    pub band: u32,
    pub kpoint: u32,
    pub energy: f64,
}

/// Collapse a table to one point per (spin, band, kpoint), sorted for plotting.
pub fn band_series(table: &Table) -> Vec<BandPoint> {
    let mut points: BTreeMap<(u32, u32, u32), f64> = BTreeMap::new();
    for r in table {
        points.entry((r.spin, r.band, r.kpoint)).or_insert(r.energy);
    }
    points
        .into_iter()
        .map(|((spin, band, kpoint), energy)| BandPoint {
            spin,
            band,
            kpoint,
            energy,
        })
        .collect()
}
