use std::io::{self, Write};

use anyhow::Result;
use arrow::util::pretty::pretty_format_batches;

use rusty_procar::data::cache::to_record_batch;
use rusty_procar::data::orbital::describe_orbital;
use rusty_procar::{BandPoint, ChargeSpilling, IonKey, OrbitalKey, Share, Table, TableSummary};

/// Rows printed per Arrow batch when dumping a table.
const PRINT_BATCH_ROWS: usize = 8 * 1024;

pub fn print_summary(summary: &TableSummary) -> Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "Number of records: {}", summary.records)?;
    writeln!(out, "Number of unique Spins: {}", summary.spins)?;
    writeln!(out, "Number of unique Kpoints: {}", summary.kpoints)?;
    writeln!(out, "Number of unique Bands: {}", summary.bands)?;
    writeln!(out, "Number of unique Ions: {}", summary.ions)?;
    writeln!(out, "Number of unique Orbitals: {}", summary.orbitals)?;
    Ok(())
}

pub fn print_no_rows(what: &str) -> Result<()> {
    writeln!(io::stdout().lock(), "No {what} matched")?;
    Ok(())
}

/// Dump a table as an aligned text grid, sorted by key.
pub fn print_table(table: &Table) -> Result<()> {
    if table.is_empty() {
        return print_no_rows("records");
    }
    let sorted = table.sorted();
    let batches = sorted
        .records()
        .chunks(PRINT_BATCH_ROWS)
        .map(to_record_batch)
        .collect::<Result<Vec<_>, _>>()?;
    writeln!(io::stdout().lock(), "{}", pretty_format_batches(&batches)?)?;
    Ok(())
}

pub fn print_band_points(points: &[BandPoint]) -> Result<()> {
    if points.is_empty() {
        return print_no_rows("bands");
    }
    let mut out = io::stdout().lock();
    writeln!(out, "{:>4} {:>6} {:>6} {:>12}", "Spin", "Band", "Kpoint", "Energy (eV)")?;
    for p in points {
        writeln!(out, "{:>4} {:>6} {:>6} {:>12.4}", p.spin, p.band, p.kpoint, p.energy)?;
    }
    Ok(())
}

pub fn print_orbital_shares(shares: &[Share<OrbitalKey>]) -> Result<()> {
    if shares.is_empty() {
        return print_no_rows("orbitals");
    }
    let mut out = io::stdout().lock();
    let mut current = None;
    for s in shares {
        let state = (s.key.spin, s.key.kpoint, s.key.band);
        if current != Some(state) {
            writeln!(
                out,
                "Spin: {}  Kpoint: {}  Band: {}",
                s.key.spin, s.key.kpoint, s.key.band
            )?;
            current = Some(state);
        }
        writeln!(
            out,
            "  Orbital {} ({}): {:.3}%",
            s.key.orbital,
            describe_orbital(&s.key.orbital),
            s.percent
        )?;
    }
    Ok(())
}

pub fn print_ion_shares(shares: &[Share<IonKey>]) -> Result<()> {
    if shares.is_empty() {
        return print_no_rows("ions");
    }
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{:>4} {:>6} {:>6} {:>5} {:>12} {:>9}",
        "Spin", "Kpoint", "Band", "Ion", "Value", "Percent"
    )?;
    for s in shares {
        writeln!(
            out,
            "{:>4} {:>6} {:>6} {:>5} {:>12.6} {:>8.3}%",
            s.key.spin, s.key.kpoint, s.key.band, s.key.ion, s.value, s.percent
        )?;
    }
    Ok(())
}

pub fn print_spilling(spilling: &[ChargeSpilling]) -> Result<()> {
    if spilling.is_empty() {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    writeln!(out, "Charge spilling")?;
    writeln!(
        out,
        "{:>6} {:>6} {:>12} {:>12}",
        "Kpoint", "Band", "Projected", "Spilling"
    )?;
    for s in spilling {
        writeln!(
            out,
            "{:>6} {:>6} {:>12.6} {:>12.6}",
            s.kpoint, s.band, s.projected, s.spilling
        )?;
    }
    Ok(())
}
