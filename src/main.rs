use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use cadunico_vuln::algorithm::SummaryAccumulator;
use cadunico_vuln::utils::logging::console::{print_detected_format, print_sample_rows};
use cadunico_vuln::utils::synthetic::SyntheticHouseholds;
use cadunico_vuln::{
    CsvSink, DegenerateVariancePolicy, HouseholdSink, MissingValueStrategy, NormalizationStrategy,
    ParquetSink, PipelineConfig, ReferenceTieBreak, SourceSet, VulnerabilityPipeline,
    detect_format, read_household_table,
};
use clap::{Args, Parser, Subcommand};
use log::info;

#[derive(Parser)]
#[command(name = "cadunico-vuln")]
#[command(about = "Household vulnerability scoring over CadÚnico extracts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score the households of register extracts
    Score {
        /// Family register extract
        #[arg(long, required_unless_present = "table")]
        family: Option<PathBuf>,

        /// Person register extract with the reference persons
        #[arg(long)]
        persons: Option<PathBuf>,

        /// Bolsa Família payment extract
        #[arg(long)]
        benefits: Option<PathBuf>,

        /// Re-process a household table written by an earlier run
        #[arg(long, conflicts_with_all = ["family", "persons", "benefits"])]
        table: Option<PathBuf>,

        /// Output file (.csv or .parquet)
        #[arg(short, long)]
        output: PathBuf,

        /// Write the run summary as JSON to this file
        #[arg(long)]
        summary_json: Option<PathBuf>,

        #[command(flatten)]
        options: PipelineOptions,
    },
    /// Detect the layout, encoding and delimiter of an extract
    Detect {
        /// Extract to inspect
        path: PathBuf,

        /// Data rows parsed per candidate format
        #[arg(long, default_value = "100")]
        sample_rows: usize,

        /// Rows to print
        #[arg(long, default_value = "5")]
        show: usize,
    },
    /// Generate a synthetic canonical household table
    Synthetic {
        /// Number of households
        #[arg(short, long, default_value = "1000")]
        rows: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Probability of blanking a cell
        #[arg(long, default_value = "0.0")]
        missing_rate: f64,

        /// Output file (.csv or .parquet)
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Summarize a scored household table
    Summary {
        /// Scored table written by `score`
        path: PathBuf,

        /// Municipalities to list
        #[arg(long, default_value = "10")]
        municipalities: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct PipelineOptions {
    /// Missing-value strategy (median, mean, mode, drop)
    #[arg(long)]
    missing: Option<String>,

    /// Duplicate reference persons (first, error, merge)
    #[arg(long)]
    tie_break: Option<String>,

    /// Income normalization (batch, global, reference:<mean>:<sd>)
    #[arg(long)]
    normalization: Option<String>,

    /// Income without variance (error, clamp)
    #[arg(long)]
    degenerate_variance: Option<String>,

    /// Rows per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Show a progress spinner
    #[arg(long)]
    progress: bool,
}

impl PipelineOptions {
    /// Environment configuration with command-line overrides
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config =
            PipelineConfig::from_env().context("Invalid configuration in environment")?;
        if let Some(value) = self.missing {
            config = config.with_missing_strategy(value.parse::<MissingValueStrategy>()?);
        }
        if let Some(value) = self.tie_break {
            config = config.with_tie_break(value.parse::<ReferenceTieBreak>()?);
        }
        if let Some(value) = self.normalization {
            config = config.with_normalization(value.parse::<NormalizationStrategy>()?);
        }
        if let Some(value) = self.degenerate_variance {
            config = config.with_degenerate_variance(value.parse::<DegenerateVariancePolicy>()?);
        }
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        Ok(config.with_progress(self.progress))
    }
}

fn create_sink(path: &Path) -> Result<Box<dyn HouseholdSink>> {
    let parquet = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    if parquet {
        Ok(Box::new(ParquetSink::new(path)))
    } else {
        let sink = CsvSink::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Box::new(sink))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            family,
            persons,
            benefits,
            table,
            output,
            summary_json,
            options,
        } => {
            let start = Instant::now();
            let pipeline = VulnerabilityPipeline::new(options.into_config()?);
            let mut sink = create_sink(&output)?;

            let summary = match (table, family) {
                (Some(table), _) => pipeline
                    .run_household_table(&table, sink.as_mut())
                    .with_context(|| format!("Failed to re-process {}", table.display()))?,
                (None, Some(family)) => {
                    let mut sources = SourceSet::new(family);
                    sources.persons = persons;
                    sources.benefits = benefits;
                    pipeline
                        .run(&sources, sink.as_mut())
                        .with_context(|| format!("Failed to score {}", sources.family.display()))?
                }
                (None, None) => anyhow::bail!("either --family or --table is required"),
            };

            println!("{}", summary.summary.render(10));
            if let Some(path) = summary_json {
                let json = serde_json::to_string_pretty(&summary)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            info!(
                "Wrote {} of {} households to {} in {:?}",
                summary.rows_written,
                summary.rows_read,
                output.display(),
                start.elapsed()
            );
        }
        Commands::Detect {
            path,
            sample_rows,
            show,
        } => {
            let format = detect_format(&path, sample_rows)
                .with_context(|| format!("Failed to detect {}", path.display()))?;
            print_detected_format(&format);

            let mut reader =
                cadunico_vuln::reader::RawTableReader::open(&path, format, show.max(1))?;
            if let Some(batch) = reader.next() {
                print_sample_rows(&batch?, show)?;
            }
        }
        Commands::Synthetic {
            rows,
            seed,
            missing_rate,
            output,
        } => {
            let batch = SyntheticHouseholds::new(seed)
                .with_missing_rate(missing_rate)
                .generate(rows)?;
            let mut sink = create_sink(&output)?;
            sink.write_batch(&batch)?;
            sink.finish()?;
            info!("Wrote {rows} synthetic households to {}", output.display());
        }
        Commands::Summary {
            path,
            municipalities,
            json,
        } => {
            let batches = read_household_table(&path, cadunico_vuln::config::DEFAULT_CHUNK_SIZE)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let mut accumulator = SummaryAccumulator::default();
            for batch in &batches {
                accumulator.add_batch(batch)?;
            }
            let summary = accumulator.finish();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary.render(municipalities));
            }
        }
    }

    Ok(())
}
