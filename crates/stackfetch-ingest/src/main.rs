//! Stackfetch - sample source files from The Stack v2

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::MultiProgress;
use stackfetch_common::logging::{init_logging_with_writer, LogConfig, LogLevel, LogOutput};
use stackfetch_ingest::config::{BlobStoreConfig, DatasetProfile, HfConfig, SubsetRef};
use stackfetch_ingest::language::Language;
use stackfetch_ingest::pipeline::{run_ingest, IngestOptions, SplitTarget};
use stackfetch_ingest::progress::{ProgressObserver, ProgressWriter};
use stackfetch_ingest::resolver::{ContentResolver, S3BlobResolver};
use stackfetch_ingest::source::DatasetsServerSource;
use stackfetch_ingest::{config, extract, stats};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stackfetch")]
#[command(author, version, about = "Sample source files from The Stack v2")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream samples for one language into a JSON-lines log
    Fetch {
        /// Language to sample
        #[arg(value_enum)]
        language: Language,

        /// Dataset mirror to stream from
        #[arg(short, long, value_enum, default_value_t = DatasetProfile::Dedup)]
        dataset: DatasetProfile,

        /// Number of samples to write
        #[arg(short = 'n', long, default_value_t = config::DEFAULT_SAMPLE_COUNT)]
        count: usize,

        /// Log path (defaults to `<lang>_samples.jsonl`)
        #[arg(long)]
        jsonl: Option<PathBuf>,

        /// Directory for per-sample files (defaults to `<lang>_code_output`)
        #[arg(short, long)]
        outdir: Option<PathBuf>,

        /// Only write the log, no per-sample files
        #[arg(long)]
        no_split: bool,
    },

    /// Write one file per sample from an existing log
    Extract {
        /// Language whose extension the files get
        #[arg(value_enum)]
        language: Language,

        /// Profile used for the default paths
        #[arg(short, long, value_enum, default_value_t = DatasetProfile::Dedup)]
        dataset: DatasetProfile,

        /// Log to read
        #[arg(long)]
        jsonl: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        outdir: Option<PathBuf>,
    },

    /// Show row counts of the dedup subsets
    Stats {
        /// Languages to query, or `all`
        #[arg(required = true, num_args = 1..)]
        languages: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("stackfetch".to_string())
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // Console logging pauses the progress bars while it writes
    let multi = MultiProgress::new();
    if let Err(e) = init_logging_with_writer(&log_config, ProgressWriter::new(multi.clone())) {
        eprintln!("Warning: logging disabled: {e}");
    }

    if let Err(e) = execute(cli.command, &multi).await {
        error!(error = %format!("{e:#}"), "Command failed");
        process::exit(1);
    }
}

async fn execute(command: Command, multi: &MultiProgress) -> Result<()> {
    match command {
        Command::Fetch {
            language,
            dataset,
            count,
            jsonl,
            outdir,
            no_split,
        } => {
            let limit = NonZeroUsize::new(count).ok_or_else(|| anyhow!("--count must be at least 1"))?;

            // Credentials are checked before touching the network or the disk
            let blob_store = if dataset.needs_blob_store() {
                Some(BlobStoreConfig::from_env()?)
            } else {
                None
            };

            let log_path = jsonl.unwrap_or_else(|| dataset.default_jsonl(language));
            let split = (!no_split).then(|| SplitTarget {
                dir: outdir.unwrap_or_else(|| dataset.default_outdir(language)),
                extension: language.extension().to_string(),
            });

            let hf = HfConfig::from_env();
            let client = hf.http_client()?;
            let subset = SubsetRef::new(dataset, language);
            info!(subset = %subset, limit = limit.get(), "Starting fetch");

            let mut source = DatasetsServerSource::open(client, hf, subset).await?;
            let resolver = blob_store.as_ref().map(S3BlobResolver::from_config);

            let options = IngestOptions {
                limit,
                log_path,
                split,
            };
            let mut progress =
                ProgressObserver::new(multi, limit.get(), &format!("Fetching {}", language.key()));

            let summary = run_ingest(
                &mut source,
                resolver.as_ref().map(|r| r as &dyn ContentResolver),
                &options,
                &mut progress,
            )
            .await?;

            println!(
                "{} samples written to {} ({} skipped)",
                summary.written,
                summary.log_path.display(),
                summary.skipped
            );
            if let Some(target) = &options.split {
                println!("Sample files in {}", target.dir.display());
            }
        },

        Command::Extract {
            language,
            dataset,
            jsonl,
            outdir,
        } => {
            let log_path = jsonl.unwrap_or_else(|| dataset.default_jsonl(language));
            let out_dir = outdir.unwrap_or_else(|| dataset.default_outdir(language));

            let summary = extract::extract_samples(&log_path, &out_dir, language.extension())
                .with_context(|| format!("extracting {}", log_path.display()))?;

            println!(
                "{} files written to {} ({} skipped)",
                summary.written,
                out_dir.display(),
                summary.skipped
            );
        },

        Command::Stats { languages } => {
            let languages = parse_languages(&languages)?;
            let hf = HfConfig::from_env();
            let client = hf.http_client()?;

            let report = stats::fetch_subset_stats(&client, &hf, &languages).await;
            println!("{report}");
        },
    }

    Ok(())
}

/// Accept language keys or `all`
fn parse_languages(args: &[String]) -> Result<Vec<Language>> {
    if args.iter().any(|a| a.eq_ignore_ascii_case("all")) {
        return Ok(Language::ALL.to_vec());
    }

    let mut languages = Vec::with_capacity(args.len());
    for arg in args {
        let language: Language = arg.parse()?;
        if !languages.contains(&language) {
            languages.push(language);
        }
    }
    Ok(languages)
}
