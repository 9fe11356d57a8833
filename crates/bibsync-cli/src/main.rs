use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bibsync_bibtex::{Btac, CompletionOracle};
use bibsync_core::config_file::{self, ConfigFile};
use bibsync_core::{AuthorQuery, CompareRequest, Config, ProgressEvent, ReconcilePool};

mod output;

use output::ColorMode;

/// Bibliography gap finder - compare a local .bib file against publication indexes
#[derive(Parser, Debug)]
#[command(name = "bibsync", version, about, long_about = None)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find publications missing from (or only present in) a local .bib file
    Compare(CompareArgs),

    /// List local publications by year and author name fragments
    List {
        /// Path to the .bib file
        bib: PathBuf,

        /// Comma-separated years to show (default: all)
        #[arg(long, value_delimiter = ',')]
        years: Vec<String>,

        /// First name fragment
        #[arg(long, default_value = "")]
        first: String,

        /// Last name fragment
        #[arg(long, default_value = "")]
        last: String,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Complete a record from a DOI or a title using btac
    Complete {
        /// A DOI (starting with "10.") or a title
        input: String,

        /// Path to the btac executable
        #[arg(long, default_value = "btac")]
        btac: PathBuf,
    },

    /// Replace LaTeX accent escapes in a .bib file with Unicode characters
    Preprocess {
        /// Input .bib file
        input: PathBuf,

        /// Output .bib file
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Path to the local .bib file
    bib: PathBuf,

    /// Author first name
    #[arg(long)]
    first: String,

    /// Author last name
    #[arg(long)]
    last: String,

    /// Comma-separated years, e.g. 2020,2021
    #[arg(long, value_delimiter = ',', required = true)]
    years: Vec<String>,

    /// Comma-separated sources to query (default: all enabled)
    #[arg(long, value_delimiter = ',')]
    sources: Vec<String>,

    /// Write the missing publications to this .bib file
    #[arg(long)]
    missing_out: Option<PathBuf>,

    /// Write a year-keyed JSON snapshot of everything crawled
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write everything crawled as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Minimum DOI similarity (0-100)
    #[arg(long)]
    doi_threshold: Option<f64>,

    /// Minimum title similarity (0-100)
    #[arg(long)]
    title_threshold: Option<f64>,

    /// Semantic Scholar API key
    #[arg(long)]
    s2_api_key: Option<String>,

    /// Contact address for the Crossref polite pool
    #[arg(long)]
    crossref_mailto: Option<String>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Command::Compare(args) => compare(args).await,
        Command::List {
            bib,
            years,
            first,
            last,
            no_color,
        } => list(&bib, years, &first, &last, no_color),
        Command::Complete { input, btac } => complete(&input, btac).await,
        Command::Preprocess { input, output } => {
            bibsync_bibtex::preprocess_bib_file(&input, &output)
                .with_context(|| format!("failed to preprocess {}", input.display()))?;
            println!("Preprocessed bibliography saved as {}", output.display());
            Ok(())
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG`, and optionally to a file.
fn init_logging(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn,bibsync_core=info,bibsync_bibtex=info,bibsync=info".into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let name = path
                .file_name()
                .with_context(|| format!("invalid log file path {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(args: &CompareArgs) -> anyhow::Result<(Config, ConfigFile)> {
    let file = config_file::load_config();
    let mut config = Config::default();
    file.apply(&mut config);

    if let Ok(key) = std::env::var("S2_API_KEY")
        && !key.is_empty()
    {
        config.s2_api_key = Some(key);
    }
    if let Ok(mailto) = std::env::var("CROSSREF_MAILTO")
        && !mailto.is_empty()
    {
        config.crossref_mailto = Some(mailto);
    }

    if let Some(key) = &args.s2_api_key {
        config.s2_api_key = Some(key.clone());
    }
    if let Some(mailto) = &args.crossref_mailto {
        config.crossref_mailto = Some(mailto.clone());
    }
    if let Some(t) = args.doi_threshold {
        config.thresholds.doi = t;
    }
    if let Some(t) = args.title_threshold {
        config.thresholds.title = t;
    }
    if let Some(p) = &args.snapshot {
        config.snapshot_path = Some(p.clone());
    }
    if let Some(p) = &args.csv {
        config.crawled_csv_path = Some(p.clone());
    }

    config
        .thresholds
        .validate()
        .context("invalid matching thresholds (check --doi-threshold, --title-threshold and the config file)")?;
    config.refresh_rate_limiters();
    tracing::debug!(?config, "configuration resolved");
    Ok((config, file))
}

async fn compare(args: CompareArgs) -> anyhow::Result<()> {
    let (config, file) = resolve_config(&args)?;
    let color = ColorMode(!args.no_color);
    let mut writer = std::io::stdout();

    if !args.bib.exists() {
        anyhow::bail!("File not found: {}", args.bib.display());
    }
    let library = bibsync_bibtex::read_library(&args.bib)
        .with_context(|| format!("failed to read {}", args.bib.display()))?;
    writeln!(
        writer,
        "Loaded {} publications from {} ({} years)",
        library.len(),
        args.bib.display(),
        library.years().len()
    )?;

    let only = (!args.sources.is_empty()).then_some(args.sources.as_slice());
    let sources = bibsync_core::build_source_list(&config, only);
    if sources.is_empty() {
        anyhow::bail!("No sources selected (check --sources and the disabled list)");
    }

    let request = CompareRequest {
        query: AuthorQuery::new(&args.first, &args.last),
        years: args.years.clone(),
        sources,
    };

    let progress_writer: Arc<Mutex<Box<dyn Write + Send>>> =
        Arc::new(Mutex::new(Box::new(std::io::stderr())));
    let progress_cb = {
        let pw = Arc::clone(&progress_writer);
        move |event: ProgressEvent| {
            if let Ok(mut w) = pw.lock() {
                let _ = output::print_progress(&mut *w, &event, color);
                let _ = w.flush();
            }
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let pool = ReconcilePool::new(config.num_workers, cancel.clone());
    let result = bibsync_core::compare(&library, &request, &config, &pool, &progress_cb, &cancel).await;
    pool.shutdown().await;
    let outcome = result?;

    output::print_report(&mut writer, &outcome, color)?;

    let missing_out = args.missing_out.clone().or_else(|| file.missing_bib_path());
    if let (Some(path), Some(rec)) = (missing_out, &outcome.reconciliation)
        && !rec.missing.is_empty()
    {
        let missing: Vec<_> = rec
            .missing
            .iter()
            .cloned()
            .map(|r| r.with_derived_id())
            .collect();
        let n = bibsync_bibtex::write_bib_file(&path, &missing)
            .with_context(|| format!("failed to write {}", path.display()))?;
        writeln!(writer, "Wrote {} missing publications to {}", n, path.display())?;
    }

    Ok(())
}

fn list(
    bib: &Path,
    years: Vec<String>,
    first: &str,
    last: &str,
    no_color: bool,
) -> anyhow::Result<()> {
    let library = bibsync_bibtex::read_library(bib)
        .with_context(|| format!("failed to read {}", bib.display()))?;
    let years = if years.is_empty() {
        library.years().into_iter().map(String::from).collect()
    } else {
        years
    };

    let records = library.filter_for_display(&years, first, last);
    let mut writer = std::io::stdout();
    output::print_record_list(
        &mut writer,
        &format!("LOCAL PUBLICATIONS IN {}", years.join(", ")),
        &records,
        ColorMode(!no_color),
    )?;
    Ok(())
}

async fn complete(input: &str, program: PathBuf) -> anyhow::Result<()> {
    let seed = bibsync_bibtex::seed_record(input);
    if seed.title.is_empty() && seed.doi.is_empty() {
        anyhow::bail!("Nothing to complete: give a DOI or a title");
    }

    let oracle = Btac::new(program);
    let record = oracle
        .complete(&seed)
        .await
        .with_context(|| format!("{} could not complete '{}'", oracle.name(), input.trim()))?;
    print!("{}", bibsync_bibtex::format_record(&record)?);
    Ok(())
}
