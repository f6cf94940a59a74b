//! CLI binary for pdf2html.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! [`Converter`] and reports results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2html::{
    ConversionConfig, ConversionProgressCallback, ConversionStats, Converter, ProvisionerConfig,
    ToolProvisioner, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM,
};
use pdf2htmlex_auto::{is_tool_cached, DownloadProgress, HttpFetcher};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner for the whole run. Turns into a byte counter while
/// pdf2htmlEX is being downloaded.
struct CliProgress {
    bar: ProgressBar,
    downloading: AtomicBool,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(Self::spinner_style());
        bar.set_prefix("Preparing");
        bar.set_message("Checking for pdf2htmlEX…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            downloading: AtomicBool::new(false),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }

    fn download_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS)
    }

    /// Callback handed to the HTTP fetcher.
    fn download_progress(self: &Arc<Self>) -> DownloadProgress {
        let this = Arc::clone(self);
        Arc::new(move |downloaded, total| this.on_download(downloaded, total))
    }

    fn on_download(&self, downloaded: u64, total: Option<u64>) {
        if !self.downloading.swap(true, Ordering::SeqCst) {
            self.bar.set_style(Self::download_style());
            self.bar.set_prefix("pdf2htmlEX");
        }
        if let Some(t) = total {
            if self.bar.length().unwrap_or(0) != t {
                self.bar.set_length(t);
            }
        }
        self.bar.set_position(downloaded);
        if total == Some(downloaded) {
            self.bar.set_style(Self::spinner_style());
            self.bar.set_message("Extracting…");
        }
    }
}

impl ConversionProgressCallback for CliProgress {
    fn on_provision_complete(&self, ok: bool) {
        if ok && self.downloading.load(Ordering::SeqCst) {
            self.bar.set_style(Self::spinner_style());
            self.bar
                .println(format!("{} pdf2htmlEX installed", green("✔")));
        }
    }

    fn on_conversion_start(&self, file_name: &str, input_len: usize) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(format!(
            "{file_name} {}",
            dim(&format!("({input_len} bytes)"))
        ));
    }

    fn on_conversion_complete(&self, _output_len: usize) {
        self.bar.finish_and_clear();
    }

    fn on_conversion_error(&self, _error: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert next to the input (writes report.html)
  pdf2html report.pdf

  # Choose the output file
  pdf2html report.pdf -o site/report.html

  # HTML to stdout
  pdf2html report.pdf -o -

  # Larger rendering, fonts not embedded
  pdf2html --zoom 2.0 --no-embed-fonts slides.pdf

  # Only download and extract pdf2htmlEX
  pdf2html --setup-only

  # Machine-readable summary
  pdf2html --json report.pdf > report.json

ENVIRONMENT VARIABLES:
  PDF2HTMLEX_PATH            Path to an installed pdf2htmlEX; skips download
  PDF2HTMLEX_DATA_DIR        Data directory to pass with PDF2HTMLEX_PATH
  PDF2HTMLEX_AUTO_CACHE_DIR  Override the default pdf2htmlEX cache directory

SETUP:
  pdf2htmlEX (~100 MB AppImage, Linux x86_64) is downloaded automatically on
  first run and cached in ~/.cache/pdf2html/pdf2htmlex-0.18.8.rc1/.
  On other platforms install pdf2htmlEX and set PDF2HTMLEX_PATH.
"#;

/// Convert PDF files to HTML with pdf2htmlEX.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2html",
    version,
    about = "Convert PDF files to HTML with pdf2htmlEX",
    long_about = "Convert PDF documents to self-contained HTML that preserves layout, fonts \
and graphics. pdf2htmlEX is downloaded and cached automatically on first use.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to convert.
    #[arg(required_unless_present = "setup_only")]
    input: Option<PathBuf>,

    /// Output HTML file, or "-" for stdout. Default: <input stem>.html next to the input.
    #[arg(short, long, env = "PDF2HTML_OUTPUT")]
    output: Option<PathBuf>,

    /// Zoom factor (0.5–2.0).
    #[arg(long, env = "PDF2HTML_ZOOM", default_value_t = DEFAULT_ZOOM, value_parser = parse_zoom)]
    zoom: f64,

    /// Do not embed fonts in the HTML.
    #[arg(long, env = "PDF2HTML_NO_EMBED_FONTS")]
    no_embed_fonts: bool,

    /// Conversion time limit in seconds.
    #[arg(long, env = "PDF2HTML_TIMEOUT", default_value_t = 300,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// pdf2htmlEX download timeout in seconds.
    #[arg(long, env = "PDF2HTML_DOWNLOAD_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    download_timeout: u64,

    /// Make sure pdf2htmlEX is installed, then exit.
    #[arg(long)]
    setup_only: bool,

    /// Print a JSON summary on stdout instead of text.
    #[arg(long, env = "PDF2HTML_JSON")]
    json: bool,

    /// Disable progress spinner.
    #[arg(long, env = "PDF2HTML_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2HTML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2HTML_QUIET")]
    quiet: bool,
}

fn parse_zoom(s: &str) -> Result<f64, String> {
    let z: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if z.is_finite() && (MIN_ZOOM..=MAX_ZOOM).contains(&z) {
        Ok(z)
    } else {
        Err(format!("must be between {MIN_ZOOM} and {MAX_ZOOM}"))
    }
}

#[derive(Serialize)]
struct Report<'a> {
    input: &'a Path,
    output: Option<&'a Path>,
    #[serde(flatten)]
    stats: &'a ConversionStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out
    // of its way unless asked for.
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

    // ── Build converter ──────────────────────────────────────────────────
    let progress = show_progress.then(CliProgress::new);

    let provisioner_config = ProvisionerConfig::default()
        .with_download_timeout(Duration::from_secs(cli.download_timeout));
    let fetcher = match progress {
        Some(ref p) if !is_tool_cached() => HttpFetcher::with_progress(p.download_progress()),
        _ => HttpFetcher::new(),
    };
    let provisioner = ToolProvisioner::with_fetcher(provisioner_config, Arc::new(fetcher));

    let config = ConversionConfig::builder()
        .timeout_secs(cli.timeout)
        .build()
        .context("Invalid configuration")?;

    let mut converter = Converter::new(provisioner, config);
    if let Some(ref p) = progress {
        converter = converter.with_progress(Arc::clone(p) as Arc<dyn ConversionProgressCallback>);
    }

    // ── Setup-only mode ──────────────────────────────────────────────────
    if cli.setup_only {
        let handle = converter
            .prepare()
            .await
            .context("Failed to set up pdf2htmlEX")?;
        if let Some(ref p) = progress {
            p.bar.finish_and_clear();
        }

        if cli.json {
            let report = serde_json::json!({
                "executable": handle.executable_path(),
                "data_dir": handle.resource_dir(),
                "app_dir": handle.app_dir(),
                "state": handle.ready_state().to_string(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else if !cli.quiet {
            println!("Executable:  {}", handle.executable_path().display());
            if let Some(dir) = handle.resource_dir() {
                println!("Data dir:    {}", dir.display());
            }
            if let Some(dir) = handle.app_dir() {
                println!("AppDir:      {}", dir.display());
            }
        }
        return Ok(());
    }

    let Some(input) = cli.input.as_deref() else {
        bail!("No input file given");
    };
    let embed_fonts = !cli.no_embed_fonts;
    let to_stdout = cli.output.as_deref() == Some(Path::new("-"));
    if to_stdout && cli.json {
        bail!("--json prints the summary on stdout; choose an output file with -o");
    }

    // ── Run conversion ───────────────────────────────────────────────────
    if to_stdout {
        let output = converter
            .convert_file(input, cli.zoom, embed_fonts)
            .await
            .context("Conversion failed")?;

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(&output.html_bytes)
            .context("Failed to write to stdout")?;
        handle.flush().context("Failed to write to stdout")?;

        if !cli.quiet {
            eprintln!(
                "{}  {} bytes  {}ms",
                green("✔"),
                output.stats.output_bytes,
                output.stats.duration_ms
            );
        }
        return Ok(());
    }

    let output_path = match cli.output {
        Some(ref p) => p.clone(),
        None => default_output_path(input),
    };

    let stats = match converter
        .convert_to_file(input, &output_path, cli.zoom, embed_fonts)
        .await
    {
        Ok(stats) => stats,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{} {}", red("✘"), bold(&input.display().to_string()));
            }
            return Err(e).context("Conversion failed");
        }
    };

    if cli.json {
        let report = Report {
            input,
            output: Some(&output_path),
            stats: &stats,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} → {}  {}",
            green("✔"),
            input.display(),
            bold(&output_path.display().to_string()),
            dim(&format!(
                "{} bytes  {}ms",
                stats.output_bytes, stats.duration_ms
            )),
        );
    }

    Ok(())
}

/// `<dir>/<stem>.html` for an input at `<dir>/<name>`.
fn default_output_path(input: &Path) -> PathBuf {
    let name = pdf2html::suggested_file_name(&input.to_string_lossy());
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
