use std::f64::consts::PI;
use std::path::PathBuf;

use anyhow::{Context, Result};

use rusty_procar::data::cache;
use rusty_procar::{normalize, EigenArray, ProjectionArray};

const NKPOINTS: usize = 40;
const NBANDS: usize = 12;
const NIONS: usize = 4;
const NORBITALS: usize = 9;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// Cosine-shaped band: centre, dispersion and phase vary with the band index.
fn band_energy(band: usize, kpoint: usize) -> f64 {
    let centre = -8.0 + 1.5 * band as f64;
    let width = 0.4 + 0.15 * (band % 4) as f64;
    let phase = if band % 2 == 0 { 0.0 } else { PI };
    let x = PI * kpoint as f64 / (NKPOINTS - 1) as f64;
    centre + width * (x + phase).cos()
}

/// Weights over (ion, orbital) summing to `1 - spilling`, with the band's
/// character drifting from s-like to d-like along the path.
fn band_projections(band: usize, kpoint: usize, rng: &mut SimpleRng) -> Vec<Vec<f64>> {
    let t = kpoint as f64 / (NKPOINTS - 1) as f64;
    let raw: Vec<Vec<f64>> = (0..NIONS)
        .map(|ion| {
            let ion_weight = 1.0 + ((ion + band) % NIONS) as f64;
            (0..NORBITALS)
                .map(|orb| {
                    let character = match orb {
                        0 => 1.0 - t,
                        1..=3 => 0.5,
                        _ => t,
                    };
                    ion_weight * character * rng.uniform(0.5, 1.5)
                })
                .collect()
        })
        .collect();

    let total: f64 = raw.iter().flatten().sum();
    let captured = 1.0 - rng.uniform(0.01, 0.05);
    raw.into_iter()
        .map(|ion| ion.into_iter().map(|w| w / total * captured).collect())
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let eigenvalues: Vec<Vec<(f64, f64)>> = (0..NKPOINTS)
        .map(|k| {
            (0..NBANDS)
                .map(|b| {
                    let energy = band_energy(b, k) + rng.uniform(-0.01, 0.01);
                    (energy, if energy < 0.0 { 1.0 } else { 0.0 })
                })
                .collect()
        })
        .collect();

    let projections: Vec<Vec<Vec<Vec<f64>>>> = (0..NKPOINTS)
        .map(|k| (0..NBANDS).map(|b| band_projections(b, k, &mut rng)).collect())
        .collect();

    let table = normalize(
        &EigenArray::from_nested(vec![eigenvalues])?,
        &ProjectionArray::from_nested(vec![projections])?,
    )?;

    let output_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_procar.parquet"));
    cache::save(&table, &output_path)
        .with_context(|| format!("writing {}", output_path.display()))?;

    println!(
        "Wrote {} records ({NKPOINTS} k-points, {NBANDS} bands, {NIONS} ions, {NORBITALS} orbitals) to {}",
        table.len(),
        output_path.display()
    );
    Ok(())
}
