use std::collections::BTreeMap;

use serde::Serialize;

use super::filter::{query, Query};
use super::model::{Orbital, Record, Table};
use super::orbital::OrbitalGroup;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Grouped sum, normalized per partition
// ---------------------------------------------------------------------------

/// Summed value of one group and its share of the partition it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share<K> {
    #[serde(flatten)]
    pub key: K,
    pub value: f64,
    /// Percent of the partition total; 0 when the partition sums to zero.
    pub percent: f64,
}

/// Sum `value` per `group` key, then express each sum as a percentage of the
/// total over all groups that map to the same `partition`.
///
/// Results come back ordered by group key.
pub fn normalized_shares<'a, K, P>(
    records: impl IntoIterator<Item = &'a Record>,
    group: impl Fn(&Record) -> K,
    partition: impl Fn(&K) -> P,
) -> Vec<Share<K>>
where
    K: Ord,
    P: Ord,
{
    let mut sums: BTreeMap<K, f64> = BTreeMap::new();
    for r in records {
        *sums.entry(group(r)).or_insert(0.0) += r.value;
    }

    let mut totals: BTreeMap<P, f64> = BTreeMap::new();
    for (key, value) in &sums {
        *totals.entry(partition(key)).or_insert(0.0) += value;
    }
    let degenerate = totals.values().filter(|t| **t == 0.0).count();
    if degenerate > 0 {
        log::warn!("{degenerate} partition(s) have zero total projection; their shares are reported as 0%");
    }

    sums.into_iter()
        .map(|(key, value)| {
            let total = totals.get(&partition(&key)).copied().unwrap_or(0.0);
            let percent = if total == 0.0 { 0.0 } else { value / total * 100.0 };
            Share {
                key,
                value,
                percent,
            }
        })
        .collect()
}

/// Group key of an orbital share.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrbitalKey {
    pub spin: u32,
    pub kpoint: u32,
    pub band: u32,
    pub orbital: Orbital,
}

/// Group key of an ion share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IonKey {
    pub spin: u32,
    pub kpoint: u32,
    pub band: u32,
    pub ion: u32,
}

fn is_raw(r: &Record) -> bool {
    !r.orbital.is_composite()
}

// ---------------------------------------------------------------------------
// Orbital aggregation
// ---------------------------------------------------------------------------

/// Append one derived record per (spin, kpoint, band) holding the summed
/// weight of the group's orbitals, across all ions.
///
/// The raw records are kept. Derived rows from an earlier sum with the same
/// label are replaced.
pub fn with_orbital_sum(table: &Table, group: &OrbitalGroup) -> Table {
    let label = group.as_orbital();

    let mut sums: BTreeMap<(u32, u32, u32), (f64, f64, f64)> = BTreeMap::new();
    for r in table
        .iter()
        .filter(|r| r.orbital.index().is_some_and(|i| group.contains(i)))
    {
        sums.entry(r.state()).or_insert((r.energy, r.occupation, 0.0)).2 += r.value;
    }

    let mut records: Vec<Record> = table.iter().filter(|r| r.orbital != label).cloned().collect();
    records.extend(
        sums.into_iter()
            .map(|((spin, kpoint, band), (energy, occupation, value))| Record {
                spin,
                kpoint,
                band,
                ion: None,
                orbital: label.clone(),
                energy,
                occupation,
                value,
            }),
    );
    Table::from_trusted(records)
}

/// Sum over ions, leaving one record per (spin, kpoint, band, orbital).
pub fn collapse_ions(table: &Table) -> Table {
    let mut collapsed: BTreeMap<(u32, u32, u32, Orbital), Record> = BTreeMap::new();
    for r in table {
        collapsed
            .entry((r.spin, r.kpoint, r.band, r.orbital.clone()))
            .and_modify(|acc| acc.value += r.value)
            .or_insert_with(|| Record {
                ion: None,
                ..r.clone()
            });
    }
    Table::from_trusted(collapsed.into_values().collect())
}

/// Records of a single band, restricted to `ions` (all when empty) and
/// summed over ions.
pub fn orbital_variation(table: &Table, band: u32, ions: &[u32]) -> Result<Table> {
    let selected = query(table, &Query::new().band(band).ions(ions.iter().copied()))?;
    Ok(collapse_ions(&selected))
}

/// Percent contribution of each orbital per (kpoint, band).
///
/// Spin channels share one total, so at each k-point the shares of both
/// spins together make up 100%. Composite rows are ignored so they do not
/// count twice.
pub fn orbital_percentages(table: &Table) -> Vec<Share<OrbitalKey>> {
    normalized_shares(
        table.iter().filter(|r| is_raw(r)),
        |r| OrbitalKey {
            spin: r.spin,
            kpoint: r.kpoint,
            band: r.band,
            orbital: r.orbital.clone(),
        },
        |k| (k.kpoint, k.band),
    )
}

/// Projection weight not captured by the local basis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChargeSpilling {
    pub kpoint: u32,
    pub band: u32,
    /// Total projected weight over all spins, ions and orbitals.
    pub projected: f64,
    /// `1 - projected`.
    pub spilling: f64,
}

/// Charge spilling per (kpoint, band), from raw orbital rows only. On a
/// single-band table this is one value per k-point.
pub fn charge_spilling(table: &Table) -> Vec<ChargeSpilling> {
    let mut sums: BTreeMap<(u32, u32), f64> = BTreeMap::new();
    for r in table.iter().filter(|r| is_raw(r)) {
        *sums.entry((r.kpoint, r.band)).or_insert(0.0) += r.value;
    }
    sums.into_iter()
        .map(|((kpoint, band), projected)| ChargeSpilling {
            kpoint,
            band,
            projected,
            spilling: 1.0 - projected,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Compositional aggregation
// ---------------------------------------------------------------------------

/// Percent contribution of each ion to `band`, per kpoint. Both spin
/// channels count towards the k-point total.
pub fn ion_composition(table: &Table, band: u32) -> Vec<Share<IonKey>> {
    normalized_shares(
        table
            .iter()
            .filter(|r| r.band == band && r.ion.is_some() && is_raw(r)),
        |r| IonKey {
            spin: r.spin,
            kpoint: r.kpoint,
            band: r.band,
            ion: r.ion.unwrap_or_default(),
        },
        |k| (k.kpoint, k.band),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    /// Two k-points, one band, two ions, four orbitals; the weights at each
    /// k-point add up to `total`.
    fn table(total: f64) -> Table {
        let weights = [
            [[0.10, 0.20, 0.05, 0.15], [0.20, 0.10, 0.10, 0.10]],
            [[0.30, 0.05, 0.05, 0.10], [0.05, 0.25, 0.10, 0.10]],
        ];
        let mut records = Vec::new();
        for (k, ions) in weights.iter().enumerate() {
            for (i, orbitals) in ions.iter().enumerate() {
                for (o, w) in orbitals.iter().enumerate() {
                    records.push(Record {
                        spin: 0,
                        kpoint: k as u32,
                        band: 0,
                        ion: Some(i as u32),
                        orbital: Orbital::Index(o as u32),
                        energy: -1.0 + k as f64,
                        occupation: 1.0,
                        value: w * total,
                    });
                }
            }
        }
        Table::try_from_records(records).unwrap()
    }

    /// One k-point, one band, two ions with a single s orbital, in two spin
    /// channels: up = [0.3, 0.2], down = [0.1, 0.3].
    fn two_spin_table() -> Table {
        let weights = [[0.3, 0.2], [0.1, 0.3]];
        let mut records = Vec::new();
        for (s, ions) in weights.iter().enumerate() {
            for (i, w) in ions.iter().enumerate() {
                records.push(Record {
                    spin: s as u32,
                    kpoint: 0,
                    band: 0,
                    ion: Some(i as u32),
                    orbital: Orbital::Index(0),
                    energy: -1.0 + 0.1 * s as f64,
                    occupation: 1.0,
                    value: *w,
                });
            }
        }
        Table::try_from_records(records).unwrap()
    }

    #[test]
    fn orbital_sum_appends_one_row_per_state() {
        let t = table(1.0);
        let group = OrbitalGroup::new("s+p_y", [0, 1]).unwrap();
        let out = with_orbital_sum(&t, &group);
        assert_eq!(out.len(), t.len() + 2);

        let derived: Vec<&Record> = out.iter().filter(|r| r.orbital.is_composite()).collect();
        assert_eq!(derived.len(), 2);
        let k0 = derived.iter().find(|r| r.kpoint == 0).unwrap();
        assert!((k0.value - (0.10 + 0.20 + 0.20 + 0.10)).abs() < EPS);
        assert_eq!(k0.ion, None);
        assert_eq!(k0.energy, -1.0);
    }

    #[test]
    fn repeated_orbital_sum_replaces_previous_rows() {
        let t = table(1.0);
        let psum = OrbitalGroup::lookup("Psum").unwrap();
        let once = with_orbital_sum(&t, &psum);
        let twice = with_orbital_sum(&once, &psum);
        assert!(once.same_records(&twice));
        assert!(Table::try_from_records(twice.into_records()).is_ok());
    }

    #[test]
    fn orbital_percentages_sum_to_100_per_kpoint() {
        let shares = orbital_percentages(&collapse_ions(&table(0.9)));
        assert_eq!(shares.len(), 8);
        for k in 0..2 {
            let total: f64 = shares.iter().filter(|s| s.key.kpoint == k).map(|s| s.percent).sum();
            assert!((total - 100.0).abs() < 1e-6);
        }
        let s0 = &shares[0];
        assert_eq!(s0.key.orbital, Orbital::Index(0));
        assert!((s0.percent - 30.0).abs() < 1e-6);
    }

    #[test]
    fn composite_rows_do_not_skew_percentages() {
        let t = with_orbital_sum(&table(1.0), &OrbitalGroup::lookup("p").unwrap());
        let shares = orbital_percentages(&t);
        assert!(shares.iter().all(|s| !s.key.orbital.is_composite()));
        let total: f64 = shares.iter().filter(|s| s.key.kpoint == 1).map(|s| s.percent).sum();
        assert!((total - 100.0).abs() < 1e-6);
    }

    #[test]
    fn ion_composition_sums_to_100() {
        let shares = ion_composition(&table(0.8), 0);
        assert_eq!(shares.len(), 4);
        for k in 0..2 {
            let total: f64 = shares.iter().filter(|s| s.key.kpoint == k).map(|s| s.percent).sum();
            assert!((total - 100.0).abs() < 1e-6);
        }
        assert!((shares[0].percent - 50.0).abs() < 1e-6);
        assert!(ion_composition(&table(1.0), 5).is_empty());
    }

    #[test]
    fn zero_totals_yield_zero_percent() {
        let shares = ion_composition(&table(0.0), 0);
        assert!(shares.iter().all(|s| s.percent == 0.0));
    }

    #[test]
    fn spilling_is_one_minus_projection() {
        let spill = charge_spilling(&table(0.95));
        assert_eq!(spill.len(), 2);
        for s in &spill {
            assert!((s.projected - 0.95).abs() < EPS);
            assert!((s.spilling - 0.05).abs() < EPS);
        }
    }

    #[test]
    fn ion_shares_span_both_spins() {
        let shares = ion_composition(&two_spin_table(), 0);
        assert_eq!(shares.len(), 4);
        let total: f64 = shares.iter().map(|s| s.percent).sum();
        assert!((total - 100.0).abs() < 1e-6);

        let percent = |spin, ion| {
            shares
                .iter()
                .find(|s| s.key.spin == spin && s.key.ion == ion)
                .map(|s| s.percent)
                .unwrap()
        };
        assert!((percent(0, 0) - 100.0 * 0.3 / 0.9).abs() < 1e-6);
        assert!((percent(1, 1) - 100.0 * 0.3 / 0.9).abs() < 1e-6);
    }

    #[test]
    fn orbital_shares_span_both_spins() {
        let shares = orbital_percentages(&collapse_ions(&two_spin_table()));
        assert_eq!(shares.len(), 2);
        let total: f64 = shares.iter().map(|s| s.percent).sum();
        assert!((total - 100.0).abs() < 1e-6);
        assert!((shares[0].percent - 100.0 * 0.5 / 0.9).abs() < 1e-6);
    }

    #[test]
    fn spilling_sums_spins_into_one_value_per_kpoint() {
        let spill = charge_spilling(&two_spin_table());
        assert_eq!(spill.len(), 1);
        assert_eq!((spill[0].kpoint, spill[0].band), (0, 0));
        assert!((spill[0].projected - 0.9).abs() < EPS);
        assert!((spill[0].spilling - 0.1).abs() < EPS);
    }

    #[test]
    fn orbital_variation_restricts_ions_and_collapses() {
        let t = table(1.0);
        let all = orbital_variation(&t, 0, &[]).unwrap();
        assert_eq!(all.len(), 8);
        assert!(all.iter().all(|r| r.ion.is_none()));

        let ion1 = orbital_variation(&t, 0, &[1]).unwrap();
        let r = ion1
            .iter()
            .find(|r| r.kpoint == 1 && r.orbital == Orbital::Index(1))
            .unwrap();
        assert!((r.value - 0.25).abs() < EPS);
    }
}
