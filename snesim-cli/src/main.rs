use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;

use snesim::grid::GridStructure;
use snesim::io::{cond, gslib};
use snesim::property::Property;
use snesim::sim::pyramid::{simulate_pyramid, Level};
use snesim::stats;

/// SNESIM multiple-point simulation of a categorical property
#[derive(Parser)]
#[command(name = "snesim", version)]
struct Args {
    /// Training image in GSLIB format
    #[arg(long)]
    ti: PathBuf,

    /// Training image dimensions as NX,NY[,NZ]
    #[arg(long)]
    ti_dims: String,

    /// Output path for the simulated realization (GSLIB)
    #[arg(short, long)]
    out: PathBuf,

    /// Simulation grid dimensions as NX,NY[,NZ]
    #[arg(long)]
    dims: String,

    /// Per-level template tuple K,RX,RY,RZ; repeat per level, finest first
    #[arg(long = "level", required = true)]
    levels: Vec<String>,

    /// Path-progress percentage at or below which retrieval runs in reverse
    #[arg(long, default_value = "80.0")]
    theta: f64,

    /// PRNG seed
    #[arg(long, default_value = "77")]
    seed: u32,

    /// Sentinel value marking missing fields
    #[arg(long, default_value = "-99")]
    sentinel: f32,

    /// Field delimiter; any whitespace when omitted
    #[arg(long)]
    delimiter: Option<char>,

    /// Conditioning data table with x,y[,z] and a property column
    #[arg(long)]
    cond: Option<PathBuf>,

    /// Property column to read from the conditioning table
    #[arg(long, default_value = "facies")]
    cond_column: String,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let ti_grid = parse_dims(&args.ti_dims).context("invalid --ti-dims")?;
    let sim_grid = parse_dims(&args.dims).context("invalid --dims")?;
    if ti_grid.dim() != sim_grid.dim() {
        bail!("training image and simulation grid disagree on dimensionality");
    }

    let levels = args
        .levels
        .iter()
        .map(|s| parse_level(s))
        .collect::<Result<Vec<Level>>>()?;

    let ti_file = gslib::read_gslib(&args.ti, &ti_grid, args.sentinel, args.delimiter)
        .with_context(|| format!("reading training image {}", args.ti.display()))?;
    let ti = &ti_file.properties[0];
    if !args.quiet {
        eprintln!(
            "training image '{}': {}x{}x{}, {} informed cells, {} categories",
            ti_file.name,
            ti_grid.nx(),
            ti_grid.ny(),
            ti_grid.nz(),
            ti.informed_count(),
            stats::categories(ti).len()
        );
    }

    let realization = match &args.cond {
        Some(path) => {
            let hard =
                cond::read_cond_table(path, &sim_grid, &args.cond_column, args.sentinel, args.delimiter)
                    .with_context(|| format!("reading conditioning data {}", path.display()))?;
            if !args.quiet {
                eprintln!("conditioning data: {} hard cells", hard.informed_count());
            }
            hard
        }
        None => Property::new(sim_grid.clone()),
    };

    if !args.quiet {
        eprintln!(
            "simulating {} cells over {} level(s), theta {}%, seed {}",
            realization.len(),
            levels.len(),
            args.theta,
            args.seed
        );
    }
    let start = Instant::now();
    let result = simulate_pyramid(&realization, ti, &levels, args.theta, args.seed)?;

    gslib::write_gslib(&args.out, "snesim realization", &[("facies", &result)], args.sentinel)
        .with_context(|| format!("writing {}", args.out.display()))?;
    if !args.quiet {
        let freq = stats::frequencies(&result);
        let summary: Vec<String> = freq.iter().map(|(c, n)| format!("{c}:{n}")).collect();
        eprintln!(
            "done in {:.2}s, wrote {} ({})",
            start.elapsed().as_secs_f64(),
            args.out.display(),
            summary.join(", ")
        );
    }
    Ok(())
}

/// Parse "NX,NY" or "NX,NY,NZ" into a unit-cell grid at the origin.
fn parse_dims(s: &str) -> Result<GridStructure> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>().context("dimension is not an integer"))
        .collect::<Result<_>>()?;
    let grid = match parts.as_slice() {
        [nx, ny] => GridStructure::new_2d(*nx, *ny, 1.0, 1.0, 0.0, 0.0)?,
        [nx, ny, 1] => GridStructure::new_2d(*nx, *ny, 1.0, 1.0, 0.0, 0.0)?,
        [nx, ny, nz] => {
            GridStructure::new_3d(*nx, *ny, *nz, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0)?
        }
        _ => bail!("expected NX,NY or NX,NY,NZ, got '{s}'"),
    };
    Ok(grid)
}

/// Parse one per-level tuple "K,RX,RY,RZ".
fn parse_level(s: &str) -> Result<Level> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [k, rx, ry, rz] = parts.as_slice() else {
        bail!("expected K,RX,RY,RZ, got '{s}'");
    };
    Ok(Level {
        k: k.parse().with_context(|| format!("invalid K in '{s}'"))?,
        rx: rx.parse().with_context(|| format!("invalid RX in '{s}'"))?,
        ry: ry.parse().with_context(|| format!("invalid RY in '{s}'"))?,
        rz: rz.parse().with_context(|| format!("invalid RZ in '{s}'"))?,
    })
}
