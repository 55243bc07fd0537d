use super::model::{Orbital, Record, Table};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Raw-array contract
// ---------------------------------------------------------------------------

/// Band energies and occupations indexed `[spin][kpoint][band]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenArray {
    nspins: usize,
    nkpoints: usize,
    nbands: usize,
    data: Vec<(f64, f64)>,
}

impl EigenArray {
    /// Flatten nested `[spin][kpoint][band] -> (energy, occupation)` data.
    ///
    /// The shape is read from the first spin slab; every other slab must match.
    pub fn from_nested(spins: Vec<Vec<Vec<(f64, f64)>>>) -> Result<Self> {
        let nspins = spins.len();
        let nkpoints = spins.first().map_or(0, Vec::len);
        let nbands = spins.first().and_then(|s| s.first()).map_or(0, Vec::len);

        let mut data = Vec::with_capacity(nspins * nkpoints * nbands);
        for (s, slab) in spins.into_iter().enumerate() {
            if slab.len() != nkpoints {
                return Err(ragged("eigenvalue", format!(
                    "spin {s} has {} kpoints, expected {nkpoints}",
                    slab.len()
                )));
            }
            for (k, bands) in slab.into_iter().enumerate() {
                if bands.len() != nbands {
                    return Err(ragged("eigenvalue", format!(
                        "spin {s} kpoint {k} has {} bands, expected {nbands}",
                        bands.len()
                    )));
                }
                data.extend(bands);
            }
        }

        Ok(Self {
            nspins,
            nkpoints,
            nbands,
            data,
        })
    }

    /// (spins, kpoints, bands)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nspins, self.nkpoints, self.nbands)
    }

    pub fn get(&self, spin: usize, kpoint: usize, band: usize) -> (f64, f64) {
        self.data[(spin * self.nkpoints + kpoint) * self.nbands + band]
    }
}

/// Projection weights indexed `[spin][kpoint][band][ion][orbital]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionArray {
    nspins: usize,
    nkpoints: usize,
    nbands: usize,
    nions: usize,
    norbitals: usize,
    data: Vec<f64>,
}

impl ProjectionArray {
    /// Flatten nested `[spin][kpoint][band][ion][orbital] -> weight` data.
    pub fn from_nested(spins: Vec<Vec<Vec<Vec<Vec<f64>>>>>) -> Result<Self> {
        let nspins = spins.len();
        let first_kpoint = spins.first().and_then(|s| s.first());
        let first_band = first_kpoint.and_then(|k| k.first());
        let nkpoints = spins.first().map_or(0, Vec::len);
        let nbands = first_kpoint.map_or(0, Vec::len);
        let nions = first_band.map_or(0, Vec::len);
        let norbitals = first_band.and_then(|b| b.first()).map_or(0, Vec::len);

        let mut data = Vec::with_capacity(nspins * nkpoints * nbands * nions * norbitals);
        for (s, slab) in spins.into_iter().enumerate() {
            if slab.len() != nkpoints {
                return Err(ragged("projection", format!(
                    "spin {s} has {} kpoints, expected {nkpoints}",
                    slab.len()
                )));
            }
            for (k, bands) in slab.into_iter().enumerate() {
                if bands.len() != nbands {
                    return Err(ragged("projection", format!(
                        "spin {s} kpoint {k} has {} bands, expected {nbands}",
                        bands.len()
                    )));
                }
                for (b, ions) in bands.into_iter().enumerate() {
                    if ions.len() != nions {
                        return Err(ragged("projection", format!(
                            "spin {s} kpoint {k} band {b} has {} ions, expected {nions}",
                            ions.len()
                        )));
                    }
                    for (i, orbitals) in ions.into_iter().enumerate() {
                        if orbitals.len() != norbitals {
                            return Err(ragged("projection", format!(
                                "spin {s} kpoint {k} band {b} ion {i} has {} orbitals, expected {norbitals}",
                                orbitals.len()
                            )));
                        }
                        data.extend(orbitals);
                    }
                }
            }
        }

        Ok(Self {
            nspins,
            nkpoints,
            nbands,
            nions,
            norbitals,
            data,
        })
    }

    /// (spins, kpoints, bands, ions, orbitals)
    pub fn shape(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.nspins,
            self.nkpoints,
            self.nbands,
            self.nions,
            self.norbitals,
        )
    }

    pub fn get(&self, spin: usize, kpoint: usize, band: usize, ion: usize, orbital: usize) -> f64 {
        let block = (spin * self.nkpoints + kpoint) * self.nbands + band;
        self.data[(block * self.nions + ion) * self.norbitals + orbital]
    }
}

fn ragged(array: &'static str, details: String) -> EngineError {
    EngineError::RaggedArray { array, details }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Flatten the raw arrays into one record per (spin, kpoint, band, ion,
/// orbital), joining the band energy and occupation onto every record.
pub fn normalize(eigenvalues: &EigenArray, projections: &ProjectionArray) -> Result<Table> {
    let (nspins, nkpoints, nbands, nions, norbitals) = projections.shape();
    if eigenvalues.shape() != (nspins, nkpoints, nbands) {
        return Err(EngineError::ShapeMismatch {
            eigenvalues: eigenvalues.shape(),
            projections: (nspins, nkpoints, nbands),
        });
    }

    let mut records = Vec::with_capacity(nspins * nkpoints * nbands * nions * norbitals);
    for s in 0..nspins {
        log::info!("Processing spin {s}");
        log::info!(
            "nkpoints: {nkpoints}, nbands: {nbands}, nions: {nions}, norbitals: {norbitals}"
        );
        for k in 0..nkpoints {
            for b in 0..nbands {
                let (energy, occupation) = eigenvalues.get(s, k, b);
                for i in 0..nions {
                    for o in 0..norbitals {
                        records.push(Record {
                            spin: s as u32,
                            kpoint: k as u32,
                            band: b as u32,
                            ion: Some(i as u32),
                            orbital: Orbital::Index(o as u32),
                            energy,
                            occupation,
                            value: projections.get(s, k, b, i, o),
                        });
                    }
                }
            }
        }
    }
    log::debug!("Normalized {} records", records.len());

    Ok(Table::from_trusted(records))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn eigen(nspins: usize, nkpoints: usize, nbands: usize) -> EigenArray {
        let spins = (0..nspins)
            .map(|s| {
                (0..nkpoints)
                    .map(|k| {
                        (0..nbands)
                            .map(|b| ((s * 100 + k * 10 + b) as f64, 1.0 - s as f64))
                            .collect()
                    })
                    .collect()
            })
            .collect();
        EigenArray::from_nested(spins).unwrap()
    }

    fn projections(shape: (usize, usize, usize, usize, usize)) -> ProjectionArray {
        let (ns, nk, nb, ni, no) = shape;
        let spins = (0..ns)
            .map(|s| {
                (0..nk)
                    .map(|k| {
                        (0..nb)
                            .map(|b| {
                                (0..ni)
                                    .map(|i| {
                                        (0..no)
                                            .map(|o| (s + k + b + i + o) as f64 / 100.0)
                                            .collect()
                                    })
                                    .collect()
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        ProjectionArray::from_nested(spins).unwrap()
    }

    #[test]
    fn cartesian_product_is_complete() {
        let shape = (2, 3, 2, 2, 4);
        let table = normalize(&eigen(2, 3, 2), &projections(shape)).unwrap();
        assert_eq!(table.len(), 2 * 3 * 2 * 2 * 4);

        let keys: BTreeSet<_> = table.iter().map(|r| r.key()).collect();
        assert_eq!(keys.len(), table.len());
    }

    #[test]
    fn energies_are_joined_per_band_state() {
        let ev = eigen(2, 3, 2);
        let table = normalize(&ev, &projections((2, 3, 2, 2, 4))).unwrap();
        for r in &table {
            let (energy, occupation) = ev.get(r.spin as usize, r.kpoint as usize, r.band as usize);
            assert_eq!(r.energy, energy);
            assert_eq!(r.occupation, occupation);
        }
    }

    #[test]
    fn weights_are_read_from_the_right_cell() {
        let proj = projections((1, 2, 2, 3, 4));
        let table = normalize(&eigen(1, 2, 2), &proj).unwrap();
        let r = table
            .iter()
            .find(|r| r.kpoint == 1 && r.band == 0 && r.ion == Some(2) && r.orbital == Orbital::Index(3))
            .unwrap();
        assert_eq!(r.value, proj.get(0, 1, 0, 2, 3));
        assert_eq!(r.value, 0.06);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let err = normalize(&eigen(1, 3, 2), &projections((1, 3, 4, 1, 1))).unwrap_err();
        match err {
            EngineError::ShapeMismatch {
                eigenvalues,
                projections,
            } => {
                assert_eq!(eigenvalues, (1, 3, 2));
                assert_eq!(projections, (1, 3, 4));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn ragged_input_is_rejected() {
        let err = EigenArray::from_nested(vec![vec![vec![(0.0, 1.0)], vec![]]]).unwrap_err();
        assert!(matches!(err, EngineError::RaggedArray { array: "eigenvalue", .. }));

        let err = ProjectionArray::from_nested(vec![vec![vec![vec![vec![0.1, 0.2], vec![0.3]]]]])
            .unwrap_err();
        assert!(matches!(err, EngineError::RaggedArray { array: "projection", .. }));
    }

    #[test]
    fn empty_arrays_give_an_empty_table() {
        let table = normalize(
            &EigenArray::from_nested(Vec::new()).unwrap(),
            &ProjectionArray::from_nested(Vec::new()).unwrap(),
        )
        .unwrap();
        assert!(table.is_empty());
    }
}
