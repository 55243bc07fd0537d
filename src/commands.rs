use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use rusty_procar::data::export::{self, OutputFormat};
use rusty_procar::data::{cache, loader};
use rusty_procar::{
    band_series, charge_spilling, filter_bands_by_energy, filter_bands_by_index, ion_composition,
    orbital_percentages, orbital_variation, query, with_orbital_sum, BandPoint, IonKey,
    OrbitalGroup, OrbitalKey, Query, Share, SourceKind, Table,
};

use crate::cli::{Cli, ModeArgs};
use crate::display;

/// Run the mode selected on the command line.
pub fn dispatch(cli: &Cli) -> Result<()> {
    let kind = loader::source_kind(&cli.input)?;
    if let Some(output) = &cli.output {
        OutputFormat::from_path(output)?;
    }

    if cli.mode.pickle {
        return write_cache(cli, kind);
    }

    let table = load(&cli.input)?;
    let ModeArgs {
        describe,
        bands,
        kplot,
        iplot,
        analyze,
        filter,
        ..
    } = cli.mode;

    if describe {
        display::print_summary(&table.summary())
    } else if bands {
        run_bands(cli, &table)
    } else if kplot {
        run_orbital_variation(cli, &table)
    } else if iplot {
        run_composition(cli, &table)
    } else if analyze {
        run_analysis(cli, &table)
    } else if filter {
        run_filter(cli, &table)
    } else {
        run_query(cli, &table)
    }
}

fn load(path: &Path) -> Result<Table> {
    let table = loader::load_table(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    log::info!("Loaded {} records from {}", table.len(), path.display());
    Ok(table)
}

fn required_band(cli: &Cli, mode: &str) -> Result<u32> {
    match cli.query.band {
        Some(band) => Ok(band),
        None => bail!("{mode} needs a band (--band)"),
    }
}

/// --erange bounds moved by `reference`; the window is given relative to
/// --efermi, so tables holding unshifted energies pass `cli.efermi`.
fn energy_window(cli: &Cli, reference: f64) -> Option<(f64, f64)> {
    cli.windows
        .energy()
        .map(|(emin, emax)| (emin + reference, emax + reference))
}

/// Apply --irange and --erange, in that order.
fn apply_windows(cli: &Cli, table: Table, reference: f64) -> Result<Table> {
    let mut table = table;
    if let Some((imin, imax)) = cli.windows.index() {
        table = filter_bands_by_index(&table, imin, imax)?;
    }
    if let Some((emin, emax)) = energy_window(cli, reference) {
        table = filter_bands_by_energy(&table, emin, emax)?;
    }
    Ok(table)
}

fn emit_table(cli: &Cli, table: &Table) -> Result<()> {
    match &cli.output {
        Some(path) => {
            if table.is_empty() {
                display::print_no_rows("records")?;
            }
            export::write_table(table, path)
                .with_context(|| format!("Failed to write {}", path.display()))
        }
        None => display::print_table(table),
    }
}

/// Write derived rows that have no cache representation.
fn emit_rows<T: Serialize, const N: usize>(
    path: &Path,
    rows: &[T],
    header: [&str; N],
    cells: impl Fn(&T) -> [String; N],
) -> Result<()> {
    match OutputFormat::from_path(path)? {
        OutputFormat::Csv => export::write_rows_csv(rows, header, cells, path)?,
        OutputFormat::Json => export::write_json(rows, path)?,
        OutputFormat::Cache => bail!(
            "{} holds derived rows that cannot be cached; write .csv or .json instead",
            path.display()
        ),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

fn write_cache(cli: &Cli, kind: SourceKind) -> Result<()> {
    if kind == SourceKind::Cache {
        bail!("{} is already a cache artifact", cli.input.display());
    }
    if let Some(path) = &cli.output {
        if OutputFormat::from_path(path)? != OutputFormat::Cache {
            bail!("cache output must end in .parquet or .pq: {}", path.display());
        }
    }
    let table = load(&cli.input)?;
    match &cli.output {
        Some(path) => {
            cache::save(&table, path)
                .with_context(|| format!("Failed to write cache {}", path.display()))
        }
        None => display::print_summary(&table.summary()),
    }
}

/// Band windows on the raw energies, then the query with its Fermi shift.
fn query_table(cli: &Cli, table: &Table) -> Result<Table> {
    let windowed = apply_windows(cli, table.clone(), cli.efermi)?;
    Ok(query(&windowed, &cli.query.to_query(cli.efermi)?)?)
}

fn run_query(cli: &Cli, table: &Table) -> Result<()> {
    emit_table(cli, &query_table(cli, table)?)
}

fn band_points(cli: &Cli, table: &Table) -> Result<Vec<BandPoint>> {
    let shifted = table.shift_energy(cli.efermi);
    Ok(band_series(&apply_windows(cli, shifted, 0.0)?))
}

fn run_bands(cli: &Cli, table: &Table) -> Result<()> {
    let points = band_points(cli, table)?;
    match &cli.output {
        Some(path) => emit_rows(
            path,
            &points,
            ["Spin", "Band", "Kpoint", "Energy"],
            |p| {
                [
                    p.spin.to_string(),
                    p.band.to_string(),
                    p.kpoint.to_string(),
                    p.energy.to_string(),
                ]
            },
        ),
        None => display::print_band_points(&points),
    }
}

fn run_orbital_variation(cli: &Cli, table: &Table) -> Result<()> {
    let band = required_band(cli, "--kplot")?;
    let ions = cli.query.ions.clone().unwrap_or_default();

    let variation = orbital_variation(table, band, &ions)?;
    let spilling = charge_spilling(&variation);
    let mut variation = variation;
    for label in ["Psum", "Dsum"] {
        variation = with_orbital_sum(&variation, &OrbitalGroup::lookup(label)?);
    }

    emit_table(cli, &variation)?;
    display::print_spilling(&spilling)
}

fn share_cells<K>(key_cells: impl Fn(&K) -> [String; 4]) -> impl Fn(&Share<K>) -> [String; 6] {
    move |s: &Share<K>| {
        let [a, b, c, d] = key_cells(&s.key);
        [a, b, c, d, s.value.to_string(), s.percent.to_string()]
    }
}

fn run_composition(cli: &Cli, table: &Table) -> Result<()> {
    let band = required_band(cli, "--iplot")?;
    let shares = ion_composition(table, band);
    match &cli.output {
        Some(path) => emit_rows(
            path,
            &shares,
            ["Spin", "Kpoint", "Band", "Ion", "Value", "Percent"],
            share_cells(|k: &IonKey| {
                [
                    k.spin.to_string(),
                    k.kpoint.to_string(),
                    k.band.to_string(),
                    k.ion.to_string(),
                ]
            }),
        ),
        None => display::print_ion_shares(&shares),
    }
}

fn run_analysis(cli: &Cli, table: &Table) -> Result<()> {
    let band = required_band(cli, "--analyze")?;
    let Some(kpoint) = cli.query.kpoint else {
        bail!("--analyze needs a k-point (--kpoint)");
    };
    let mut selection = Query::new().kpoint(kpoint).band(band);
    if let Some(spin) = cli.query.spin {
        selection = selection.spin(spin);
    }
    let shares = orbital_percentages(&query(table, &selection)?);
    match &cli.output {
        Some(path) => emit_rows(
            path,
            &shares,
            ["Spin", "Kpoint", "Band", "Orbital", "Value", "Percent"],
            share_cells(|k: &OrbitalKey| {
                [
                    k.spin.to_string(),
                    k.kpoint.to_string(),
                    k.band.to_string(),
                    k.orbital.to_string(),
                ]
            }),
        ),
        None => display::print_orbital_shares(&shares),
    }
}

/// Stored energies stay unshifted; only the window follows --efermi.
fn filtered_table(cli: &Cli, table: &Table) -> Result<Table> {
    let Some((emin, emax)) = energy_window(cli, cli.efermi) else {
        bail!("--filter needs an energy window (--erange)");
    };
    Ok(filter_bands_by_energy(table, emin, emax)?)
}

fn run_filter(cli: &Cli, table: &Table) -> Result<()> {
    emit_table(cli, &filtered_table(cli, table)?)
}
