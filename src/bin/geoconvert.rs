//! CLI binary for geoconvert-client.
//!
//! A thin shim over the library's `WorkflowController`: maps CLI flags to a
//! `ClientConfig`, walks one file through the workflow and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use geoconvert_client::{
    human_size, ArtifactId, CandidateFile, ClientConfig, ConversionResult, FormatCatalog,
    FormatDescriptor, HttpBackend, Locale, Phase, Preferences, SavedArtifact, ServiceError,
    SharedObserver, Step, WorkflowController, WorkflowObserver, WorkflowSnapshot,
    DEFAULT_BASE_URL,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Workflow observer for events that never reach the snapshot ───────────────

/// Prints swallowed cleanup failures above the spinner.
struct CliObserver {
    bar: Option<ProgressBar>,
}

impl CliObserver {
    fn line(&self, text: String) {
        match &self.bar {
            Some(bar) => bar.println(text),
            None => eprintln!("{text}"),
        }
    }
}

impl WorkflowObserver for CliObserver {
    fn on_stale_completion(&self, step: Step, cycle: u64) {
        tracing::debug!("dropped stale {} result from cycle {}", step, cycle);
    }

    fn on_cleanup_failed(&self, artifact: &ArtifactId, error: &ServiceError) {
        self.line(format!(
            "  {} could not release server copy {}: {}",
            cyan("⚠"),
            artifact,
            dim(&error.to_string())
        ));
    }
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_prefix("Connecting");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Spinner prefix and message for a snapshot.
fn describe(snapshot: &WorkflowSnapshot) -> (&'static str, String) {
    let name = snapshot.file_name().unwrap_or_default().to_string();
    match snapshot.phase() {
        Phase::Empty => ("Ready", "waiting for a file".into()),
        Phase::Detecting => ("Detecting", name),
        Phase::AwaitingFormat | Phase::Ready => {
            ("Detected", format!("{name} is {} data", snapshot.detected))
        }
        Phase::Converting => (
            "Converting",
            format!(
                "{name} → {}",
                snapshot.selected_format.as_deref().unwrap_or("?")
            ),
        ),
        Phase::Completed if snapshot.downloading => (
            "Downloading",
            snapshot
                .result
                .as_ref()
                .map(|r| r.filename.clone())
                .unwrap_or_default(),
        ),
        Phase::Completed => ("Converted", name),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a shapefile to GeoJSON in the current directory
  geoconvert parcels.shp --format geojson

  # Convert a GeoTIFF to PNG into ./out, server messages in French
  geoconvert dem.tif -f png -o out --lang fr

  # Show the formats the server can produce
  geoconvert --list-formats

  # Check that the server is up and GDAL is available
  geoconvert --check

  # Machine-readable result
  geoconvert --json roads.kml -f gpkg > result.json

ENVIRONMENT VARIABLES:
  GEOCONVERT_SERVER       Base URL of the conversion service
  GEOCONVERT_LANG         Language for server messages (en, fr, es)
  GEOCONVERT_PREFS        Path of the preferences file
  RUST_LOG                Override the log filter

Formats are only accepted when they match the detected data type: vector
inputs convert to vector formats, raster inputs to raster formats.
"#;

/// Convert geospatial files through a GeoConverter server.
#[derive(Parser, Debug)]
#[command(
    name = "geoconvert",
    version,
    about = "Convert vector and raster geodata through a GeoConverter server",
    long_about = "Upload a geospatial file to a GeoConverter server, let it detect whether the \
data is vector or raster, convert it to a compatible format and download the result. The server's \
copy is deleted once the download has completed.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Geospatial file to convert.
    input: Option<PathBuf>,

    /// Output format code (e.g. geojson, shp, gpkg, tif, png).
    #[arg(short, long, env = "GEOCONVERT_FORMAT")]
    format: Option<String>,

    /// Directory to save the converted file in.
    #[arg(short, long, env = "GEOCONVERT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Base URL of the conversion service.
    #[arg(long, env = "GEOCONVERT_SERVER", default_value = DEFAULT_BASE_URL)]
    server: String,

    /// Language for server messages: en, fr, es. Defaults to the saved preference.
    #[arg(long, env = "GEOCONVERT_LANG")]
    lang: Option<String>,

    /// Save --lang as the preferred language for later runs.
    #[arg(long, requires = "lang")]
    remember_lang: bool,

    /// Print the server's format catalog and exit.
    #[arg(long)]
    list_formats: bool,

    /// Check server health and exit.
    #[arg(long)]
    check: bool,

    /// Output structured JSON instead of text.
    #[arg(long, env = "GEOCONVERT_JSON")]
    json: bool,

    /// Leave an undownloaded server copy in place when interrupted.
    #[arg(long, env = "GEOCONVERT_KEEP_REMOTE")]
    keep_remote: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "GEOCONVERT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "GEOCONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "GEOCONVERT_QUIET")]
    quiet: bool,

    /// Whole-request timeout in seconds (none by default; large rasters convert slowly).
    #[arg(long, env = "GEOCONVERT_TIMEOUT")]
    timeout: Option<u64>,

    /// TCP connect timeout in seconds.
    #[arg(long, env = "GEOCONVERT_CONNECT_TIMEOUT", default_value_t = 10)]
    connect_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Language preference ──────────────────────────────────────────────
    let prefs_path = Preferences::default_path();
    let mut prefs = Preferences::load(&prefs_path).unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable preferences: {}", e);
        Preferences::default()
    });
    if cli.remember_lang {
        prefs.language = cli.lang.as_deref().map(Locale::new);
        prefs
            .save(&prefs_path)
            .context("Failed to save language preference")?;
    }
    let locale = cli
        .lang
        .as_deref()
        .map(Locale::new)
        .unwrap_or_else(|| prefs.locale());

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = ClientConfig::builder()
        .base_url(cli.server.clone())
        .locale(locale.as_str())
        .connect_timeout_secs(cli.connect_timeout)
        .cleanup_on_reset(!cli.keep_remote);
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Health check ─────────────────────────────────────────────────────
    if cli.check {
        let backend = HttpBackend::new(config.clone()).context("Failed to build HTTP client")?;
        let health = backend
            .health()
            .await
            .with_context(|| format!("Server at {} is unreachable", config.base_url))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&health).context("Failed to serialize health")?
            );
        } else {
            println!("Server:  {}", config.base_url);
            println!("Status:  {}", health.status);
            println!("GDAL:    {}", if health.gdal_available { "available" } else { "missing" });
        }
        if !health.is_healthy() {
            bail!("Server is not ready for conversions");
        }
        return Ok(());
    }

    // ── Connect ──────────────────────────────────────────────────────────
    let bar = show_progress.then(spinner);
    let observer: SharedObserver = Arc::new(CliObserver { bar: bar.clone() });
    let workflow = WorkflowController::connect(&config, Some(observer))
        .await
        .context("Failed to set up the conversion client")?;

    if cli.list_formats {
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        let catalog = workflow.catalog();
        if catalog.is_empty() {
            bail!("Server at {} offered no formats", config.base_url);
        }
        print_catalog(catalog, cli.json)?;
        return Ok(());
    }

    let Some(input) = cli.input.clone() else {
        bail!("No input file given (see --help)");
    };

    let progress = bar.clone().map(|bar| {
        let mut updates = workflow.updates();
        tokio::spawn(async move {
            while let Some(snapshot) = updates.next().await {
                let (prefix, message) = describe(&snapshot);
                bar.set_prefix(prefix);
                bar.set_message(message);
            }
        })
    });

    let started = Instant::now();
    let outcome = tokio::select! {
        outcome = run(&cli, &workflow, input) => outcome,
        _ = tokio::signal::ctrl_c() => {
            workflow.reset().await;
            Err(anyhow::anyhow!("Interrupted"))
        }
    };

    if let Some(task) = progress {
        task.abort();
    }
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let (result, saved) = match outcome {
        Ok(done) => done,
        Err(e) => {
            if !cli.quiet && !cli.json {
                eprintln!("{} {}", red("✘"), bold("Conversion failed"));
            }
            return Err(e);
        }
    };

    if cli.json {
        let body = serde_json::json!({
            "result": result,
            "saved_to": saved.path,
            "size": saved.size,
            "duration_ms": started.elapsed().as_millis() as u64,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} → {}  {}  {}",
            green("✔"),
            result.input_type,
            result.output_format,
            bold(&saved.path.display().to_string()),
            dim(&format!(
                "{} in {:.1}s",
                human_size(saved.size),
                started.elapsed().as_secs_f64()
            )),
        );
        if !result.message.is_empty() {
            eprintln!("   {}", dim(&result.message));
        }
    }

    Ok(())
}

/// Select, detect, convert and save one file.
async fn run(
    cli: &Cli,
    workflow: &WorkflowController,
    input: PathBuf,
) -> Result<(ConversionResult, SavedArtifact)> {
    let file = CandidateFile::from_path(&input)
        .await
        .with_context(|| format!("Cannot read {}", input.display()))?;
    tracing::info!("{} ({})", file.name(), human_size(file.size()));

    let kind = workflow
        .select_file(Some(file))
        .await
        .context("Type detection failed")?;

    let Some(code) = cli.format.as_deref() else {
        let available = workflow.available_formats().enabled_codes().join(", ");
        bail!(
            "{} is {kind} data; choose an output format with --format ({available})",
            input.display()
        );
    };
    workflow
        .select_format(code)
        .with_context(|| format!("Cannot convert {kind} data to '{code}'"))?;

    let result = workflow.convert().await.context("Conversion failed")?;
    let saved = workflow
        .download_to(&cli.output_dir)
        .await
        .context("Download failed")?;
    Ok((result, saved))
}

fn print_catalog(catalog: &FormatCatalog, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(catalog).context("Failed to serialise catalog")?
        );
        return Ok(());
    }
    let section = |title: &str, list: &[FormatDescriptor]| {
        println!("{}", bold(title));
        for d in list {
            println!(
                "  {} {:<24} {}",
                cyan(&format!("{:<10}", d.code)),
                d.display_name,
                dim(&format!(".{}", d.extension))
            );
        }
    };
    section("Vector formats", &catalog.vector);
    section("Raster formats", &catalog.raster);
    Ok(())
}
