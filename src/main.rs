//! Command-line entry point: converting sensor logs and training forecasters.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use climcast::{
    autodiff::Tape,
    config::ForecastConfig,
    export,
    model::Forecaster,
    normalize::Statistics,
    record,
    series,
    train::Trainer,
    window::WindowGenerator,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Columns of the Jena climate table and how scores are labelled for them.
const KNOWN_COLUMNS: [(&str, &str); 2] = [("T (degC)", "temperature"), ("rh (%)", "humidity")];

#[derive(Parser)]
#[command(name = "climcast")]
#[command(about = "Multi-step temperature and humidity forecasting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a `date,time,temperature,humidity` log into JSON lines records
    Convert {
        /// Input log file
        #[arg(short, long)]
        input: PathBuf,

        /// Output records file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Train a forecaster on a CSV table and report its test error
    Train {
        /// CSV table with a header row
        #[arg(short, long)]
        data: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Columns to forecast
        #[arg(long, num_args = 1.., default_values_t = KNOWN_COLUMNS.map(|(c, _)| c.to_string()))]
        columns: Vec<String>,

        /// Where to write the exported model
        #[arg(short, long, default_value = "forecaster.zlib")]
        output: PathBuf,

        /// Number of training epochs, overriding the configuration
        #[arg(short, long)]
        epochs: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Convert { input, output } => {
            let count = record::convert_file(&input, &output)
                .with_context(|| format!("failed to convert {}", input.display()))?;
            println!("Wrote {count} records to {}", output.display());
        }
        Commands::Train {
            data,
            config,
            columns,
            output,
            epochs,
        } => {
            let mut config = match config {
                Some(path) => ForecastConfig::from_file(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => ForecastConfig::default(),
            };
            if let Some(epochs) = epochs {
                config.epochs = epochs;
            }
            config.validate()?;
            run_training(&config, &data, &columns, &output)?;
        }
    }

    Ok(())
}

fn run_training(
    config: &ForecastConfig,
    data: &Path,
    columns: &[String],
    output: &Path,
) -> Result<()> {
    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    let series = series::load_csv(data, &names)
        .with_context(|| format!("failed to read {}", data.display()))?;
    info!(steps = series.len(), channels = series.channels(), "loaded series");

    let splits = series.split(config.split_ratios())?;
    let statistics = Statistics::fit(&splits.train).context("train split is empty")?;
    let generator = WindowGenerator::new(
        config.window_shape(),
        config.batch_size,
        config.shuffle_buffer,
        config.seed,
        statistics.clone(),
    )?;
    let mut train = generator.make_dataset(&splits.train, true)?;
    let mut validation = generator.make_dataset(&splits.validation, false)?;
    let mut test = generator.make_dataset(&splits.test, false)?;

    let tape = Tape::default();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let forecaster = Forecaster::new(
        config.window_shape(),
        series.channels(),
        config.hidden_width(),
        &mut rng,
    )?;
    let mut trainer = Trainer::new(
        &tape,
        forecaster,
        config.optimizer.build(config.learning_rate),
    );
    trainer.fit(&mut train, &mut validation, config.epochs)?;

    let evaluation = trainer.evaluate(&mut test)?;
    for (column, score) in names.iter().zip(&evaluation.mae) {
        println!("Score for {}: {score}", display_name(column));
    }

    let size = export::export(output, trainer.forecaster(), &statistics)
        .with_context(|| format!("failed to export {}", output.display()))?;
    println!("Compressed model size: {:.3} kB", size as f64 / 1024.0);
    Ok(())
}

fn display_name(column: &str) -> &str {
    KNOWN_COLUMNS
        .iter()
        .find(|(c, _)| *c == column)
        .map_or(column, |(_, name)| *name)
}
