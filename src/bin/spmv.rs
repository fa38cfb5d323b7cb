//! Command-line front end for the CSX engine: build a matrix from a
//! Matrix Market file, run SpMV against a random or ones vector, and
//! optionally save/reload the built representation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use csx::config::{Config, OptionValue};
use csx::vector::Vector;
use csx::Matrix;

#[derive(Parser)]
#[command(name = "spmv", about = "Compressed Sparse eXtended SpMV runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a matrix from a Matrix Market file and multiply it by a
    /// vector.
    Run {
        /// Path to a .mtx file.
        matrix: PathBuf,
        /// Number of worker threads.
        #[arg(long, default_value_t = 1)]
        threads: usize,
        /// Explicit `preproc.xform` sequence (e.g. "h,br{2,3},all").
        /// Automatic search runs over every encoding if omitted.
        #[arg(long)]
        xform: Option<String>,
        /// Treat the matrix as symmetric, storing only its lower
        /// triangle.
        #[arg(long)]
        symmetric: bool,
        /// Cross-check the result against a dense CSR reference
        /// multiplication.
        #[arg(long)]
        verify: bool,
        /// Save the built representation to this path after running.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Reload a previously saved archive and multiply it by a vector.
    Replay {
        archive: PathBuf,
        #[arg(long, default_value_t = 1)]
        threads: usize,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), csx::Error> {
    match cli.command {
        Command::Run { matrix, threads, xform, symmetric, verify, save } => {
            let csr = csx::mmf::read_file(&matrix)?;
            let reference = if verify { Some(csr.spmv_reference(&ones(csr.nr_cols()))) } else { None };

            let mut config = Config::default();
            config.set("runtime.nr_threads", OptionValue::Int(threads as i64));
            config.set("matrix.symmetric", OptionValue::Bool(symmetric));
            if let Some(seq) = xform {
                config.set("matrix.preproc.xform", OptionValue::Str(seq));
            }

            let built = Matrix::from_csr(csr, &config)?;
            let x = Vector::from_vec(ones(built.nr_cols()));
            let mut y = Vector::zeros(built.nr_rows());
            built.multiply(&x, &mut y)?;
            println!("y[0..{}] = {:?}", y.len().min(10), &y.as_slice()[..y.len().min(10)]);

            if let Some(expected) = reference {
                let max_abs_err = y
                    .as_slice()
                    .iter()
                    .zip(expected.iter())
                    .map(|(&a, &b)| (a - b).abs())
                    .fold(0.0, f64_max);
                println!("max |error| vs dense reference: {max_abs_err}");
            }

            if let Some(path) = save {
                built.save(&path)?;
                println!("saved archive to {}", path.display());
            }
            Ok(())
        }
        Command::Replay { archive, threads } => {
            let mut config = Config::default();
            config.set("runtime.nr_threads", OptionValue::Int(threads as i64));
            let built = Matrix::load(&archive, &config)?;
            let x = Vector::from_vec(ones(built.nr_cols()));
            let mut y = Vector::zeros(built.nr_rows());
            built.multiply(&x, &mut y)?;
            println!("y[0..{}] = {:?}", y.len().min(10), &y.as_slice()[..y.len().min(10)]);
            Ok(())
        }
    }
}

fn ones(n: usize) -> Vec<csx::Value> {
    vec![1.0; n]
}

#[cfg(not(feature = "f64"))]
fn f64_max(a: f32, b: f32) -> f32 {
    a.max(b)
}
#[cfg(feature = "f64")]
fn f64_max(a: f64, b: f64) -> f64 {
    a.max(b)
}
