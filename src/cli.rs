use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser};

use rusty_procar::data::orbital::orbital_index;
use rusty_procar::{Orbital, Query};

#[derive(Parser)]
#[command(
    name = "rusty-procar",
    about = "Query projected eigenvalues from vasprun.xml files or cached tables (0-based indices)",
    version
)]
pub struct Cli {
    /// Either a vasprun.xml file or a .parquet/.pq cache artifact
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub query: QueryArgs,

    #[command(flatten)]
    pub mode: ModeArgs,

    #[command(flatten)]
    pub windows: WindowArgs,

    /// Output file (.csv, .json or .parquet/.pq); prints to stdout if omitted
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Reference Fermi energy subtracted from all energies
    #[arg(
        long,
        value_name = "EV",
        default_value_t = 0.0,
        allow_hyphen_values = true
    )]
    pub efermi: f64,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Record predicates; every flag given must hold.
#[derive(Args)]
#[command(next_help_heading = "Query")]
pub struct QueryArgs {
    /// Spin channel of interest
    #[arg(short, long, value_name = "SPIN")]
    pub spin: Option<u32>,

    /// K-point of interest
    #[arg(short, long, value_name = "KPOINT")]
    pub kpoint: Option<u32>,

    /// Band of interest
    #[arg(short, long, value_name = "BAND")]
    pub band: Option<u32>,

    /// Ion(s) of interest; an empty list selects all ions
    #[arg(short, long = "ion", value_name = "ION", num_args = 0..)]
    pub ions: Option<Vec<u32>>,

    /// Orbital of interest: index, channel name (d_z2) or composite label (Psum)
    #[arg(long, value_name = "ORBITAL")]
    pub orbital: Option<String>,

    /// Occupation of interest
    #[arg(long, value_name = "OCC")]
    pub occupation: Option<f64>,

    /// Energy of interest, after the --efermi shift
    #[arg(short, long, value_name = "EV", allow_hyphen_values = true)]
    pub energy: Option<f64>,

    /// Inclusive energy window, after the --efermi shift
    #[arg(
        long,
        num_args = 2,
        value_names = ["EMIN", "EMAX"],
        allow_hyphen_values = true,
        conflicts_with = "energy"
    )]
    pub energy_window: Option<Vec<f64>>,
}

/// Alternative outputs to the default query dump. At most one may be given.
#[derive(Args)]
#[group(multiple = false)]
#[command(next_help_heading = "Modes")]
pub struct ModeArgs {
    /// Report the number of distinct spins, k-points, bands, ions and orbitals
    #[arg(short, long)]
    pub describe: bool,

    /// Write the normalized table of a vasprun.xml to a cache artifact (--output)
    #[arg(short, long, visible_alias = "cache")]
    pub pickle: bool,

    /// Band energies along the k-path, honouring --irange and --erange
    #[arg(long, visible_alias = "plot")]
    pub bands: bool,

    /// Orbital variation of one band (--band) with charge spilling
    #[arg(long)]
    pub kplot: bool,

    /// Ion composition of one band (--band)
    #[arg(long)]
    pub iplot: bool,

    /// Orbital percentages at one k-point (--kpoint) and band (--band)
    #[arg(short, long)]
    pub analyze: bool,

    /// Keep only complete bands inside --erange
    #[arg(long)]
    pub filter: bool,
}

/// Band selection windows.
#[derive(Args)]
#[command(next_help_heading = "Band Windows")]
pub struct WindowArgs {
    /// Keep bands lying entirely inside this energy window
    #[arg(
        long,
        num_args = 2,
        value_names = ["EMIN", "EMAX"],
        allow_hyphen_values = true
    )]
    pub erange: Option<Vec<f64>>,

    /// Keep bands whose index lies in this inclusive range
    #[arg(long, num_args = 2, value_names = ["IMIN", "IMAX"])]
    pub irange: Option<Vec<u32>>,
}

impl WindowArgs {
    pub fn energy(&self) -> Option<(f64, f64)> {
        pair(&self.erange)
    }

    pub fn index(&self) -> Option<(u32, u32)> {
        pair(&self.irange)
    }
}

fn pair<T: Copy>(values: &Option<Vec<T>>) -> Option<(T, T)> {
    match values.as_deref() {
        Some([a, b]) => Some((*a, *b)),
        _ => None,
    }
}

/// Resolve an orbital flag: channel names map to their index, anything else
/// that is not numeric is taken as a composite label.
pub fn parse_orbital(token: &str) -> Result<Orbital> {
    if token.trim().is_empty() {
        bail!("empty orbital name");
    }
    Ok(match orbital_index(token) {
        Ok(index) => Orbital::Index(index),
        Err(_) => Orbital::Composite(token.trim().to_string()),
    })
}

impl QueryArgs {
    pub fn to_query(&self, efermi: f64) -> Result<Query> {
        let mut query = Query::new();
        query.spin = self.spin;
        query.kpoint = self.kpoint;
        query.band = self.band;
        query.ions = self.ions.clone();
        query.orbital = self.orbital.as_deref().map(parse_orbital).transpose()?;
        query.occupation = self.occupation;
        if let Some(energy) = self.energy {
            query = query.energy(energy);
        }
        if let Some((min, max)) = pair(&self.energy_window) {
            query = query.energy_within(min, max);
        }
        if efermi != 0.0 {
            query = query.energy_reference(efermi);
        }
        Ok(query)
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rusty_procar::EnergyPredicate;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_flags_map_onto_predicates() {
        let cli = Cli::try_parse_from([
            "rusty-procar",
            "vasprun.xml",
            "-k",
            "3",
            "-i",
            "1",
            "4",
            "--orbital",
            "d_z2",
            "--energy-window",
            "-1.5",
            "0.5",
            "--efermi",
            "-2.0",
        ])
        .unwrap();
        let q = cli.query.to_query(cli.efermi).unwrap();
        assert_eq!(q.kpoint, Some(3));
        assert_eq!(q.ions, Some(vec![1, 4]));
        assert_eq!(q.orbital, Some(Orbital::Index(6)));
        assert_eq!(q.energy, Some(EnergyPredicate::Within { min: -1.5, max: 0.5 }));
        assert_eq!(q.energy_reference, Some(-2.0));
    }

    #[test]
    fn composite_orbital_labels_pass_through() {
        assert_eq!(parse_orbital("Psum").unwrap(), Orbital::Composite("Psum".into()));
        assert_eq!(parse_orbital("7").unwrap(), Orbital::Index(7));
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        let res = Cli::try_parse_from(["rusty-procar", "a.parquet", "--kplot", "--iplot"]);
        assert!(res.is_err());
    }

    #[test]
    fn windows_take_two_values() {
        let cli = Cli::try_parse_from([
            "rusty-procar",
            "a.parquet",
            "--bands",
            "--erange",
            "-3",
            "2",
            "--irange",
            "4",
            "9",
        ])
        .unwrap();
        assert_eq!(cli.windows.energy(), Some((-3.0, 2.0)));
        assert_eq!(cli.windows.index(), Some((4, 9)));
        assert!(cli.mode.bands);
    }
}
