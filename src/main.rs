use clap::{Parser, Subcommand};
use fundus_screen::batch::{self, BatchEvent};
use fundus_screen::fundus::FundusImage;
use fundus_screen::gate::ValidityGate;
use fundus_screen::pipeline::Pipeline;
use fundus_screen::scoring::ScorerSet;
use fundus_screen::{config, output, scan};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that screen images.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the result cache and screen every image again
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "fundus-screen")]
#[command(about = "Diabetic retinopathy screening for fundus photographs")]
#[command(long_about = "\
Diabetic retinopathy screening for fundus photographs

Each photograph first goes through a validity gate that rejects anything
that does not look like a retina. Accepted images are staged on the
five-point scale:

  0  No Diabetic Retinopathy
  1  Mild DR
  2  Moderate DR
  3  Severe DR
  4  Proliferative DR

Inputs can be files or directories. Directories are walked recursively
for jpg, jpeg, png, tif, tiff and webp files; hidden entries are skipped.

Results are written to the output directory (default: screening/):

  screening/
  ├── report.json              # diagnose: one entry per input
  ├── .screening-cache.json    # diagnose: cached results
  └── left-hemorrhages.png     # segment: one mask per lesion kind

Run 'fundus-screen gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Configuration file (used only if it exists)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run only the validity gate and print the retina probability
    Check {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Screen images and write a JSON report
    Diagnose {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Write rule-based lesion masks as PNG files
    Segment {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Check { inputs } => {
            let config = load_config(&cli.config)?;
            let scorers = ScorerSet::from_files(&config.models.validity, &config.models.severity)?;
            let gate = ValidityGate::new(&scorers);
            for path in scan::collect_inputs(&inputs, None)? {
                let result = FundusImage::open(&path).and_then(|image| gate.check(&image));
                match result {
                    Ok(validity) => output::print_check_result(&path, &validity),
                    Err(e) => eprintln!("{}: {}", path.display(), e),
                }
            }
        }
        Command::Diagnose { inputs, cache } => {
            let config = load_config(&cli.config)?;
            let scorers = ScorerSet::from_files(&config.models.validity, &config.models.severity)?;
            let (tx, printer) = spawn_printer();
            let result = batch::diagnose(
                Pipeline::new(&scorers),
                &inputs,
                &config.output.dir,
                config.output.cache && !cache.no_cache,
                Some(tx),
            );
            join_printer(printer);
            let result = result?;
            let report_path = config.output.dir.join(batch::REPORT_FILENAME);
            output::print_report_summary(&result.report, &report_path);
            println!("Cache: {}", result.cache_stats);
        }
        Command::Segment { inputs } => {
            let config = load_config(&cli.config)?;
            let (tx, printer) = spawn_printer();
            let results = batch::segment_all(&inputs, &config.output.dir, Some(tx));
            join_printer(printer);
            let results = results?;
            let written: usize = results
                .iter()
                .filter_map(|r| r.result.as_ref().ok())
                .map(|done| done.masks.len())
                .sum();
            println!("Masks: {} written to {}", written, config.output.dir.display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load `config.toml` (if present) and size the worker pool from it.
fn load_config(path: &Path) -> Result<config::ScreenConfig, config::ConfigError> {
    let config = config::load_config(path)?;
    init_thread_pool(&config.processing);
    Ok(config)
}

/// Install the tracing subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Print batch events on a dedicated thread as they arrive.
fn spawn_printer() -> (mpsc::Sender<BatchEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_batch_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

fn join_printer(printer: JoinHandle<()>) {
    if printer.join().is_err() {
        eprintln!("progress printer panicked");
    }
}
