//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pagebinder_core::ConvertConfig;
use pagebinder_graph::{StagePhase, StageReporter};
use pagebinder_shared::{AppConfig, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Pagebinder: turn web pages and HTML documents into EPUB books.
#[derive(Parser)]
#[command(
    name = "pagebinder",
    version,
    about = "Convert an HTML document or web page into an EPUB book.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert a document into an EPUB book directory.
    Convert {
        /// URL (http, https, file) or local path of the HTML document.
        source: String,

        /// Output directory (defaults to `[defaults].output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Book title (defaults to the document title).
        #[arg(long)]
        title: Option<String>,

        /// Book language (defaults to the document language).
        #[arg(long)]
        language: Option<String>,

        /// Do not download or embed images.
        #[arg(long)]
        no_images: bool,
    },

    /// Check that a book directory is a well-formed EPUB container.
    Check {
        /// Path of the book directory.
        book: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pagebinder=warn",
        1 => "pagebinder=info",
        2 => "pagebinder=debug",
        _ => "pagebinder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert {
            source,
            out,
            title,
            language,
            no_images,
        } => cmd_convert(&source, out, title, language, no_images).await,
        Command::Check { book } => cmd_check(&book),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_convert(
    source: &str,
    out: Option<PathBuf>,
    title: Option<String>,
    language: Option<String>,
    no_images: bool,
) -> Result<()> {
    let app_config = load_config()?;
    let mut config = ConvertConfig::from_app_config(&app_config);
    if let Some(out) = out {
        config.output_dir = out;
    }
    config.title = title;
    config.language = language;
    if no_images {
        config.images.enabled = false;
    }

    info!(source, output_dir = %config.output_dir.display(), "converting document");

    let start = Instant::now();
    let progress = Arc::new(CliProgress::new());
    let reporter: Arc<dyn StageReporter> = progress.clone();
    let result = pagebinder_core::convert(source, &config, reporter).await;
    progress.finish();
    let book = result?;

    println!();
    println!("  Book created successfully!");
    println!("  Title:    {}", book.title);
    println!("  Chapters: {}", book.chapter_count);
    println!("  Images:   {}", book.image_count);
    println!("  Path:     {}", book.path.display());
    println!("  Time:     {:.1}s", start.elapsed().as_secs_f64());
    println!();

    Ok(())
}

fn cmd_check(book: &std::path::Path) -> Result<()> {
    if !book.is_dir() {
        return Err(eyre!("'{}' is not a book directory", book.display()));
    }

    let check = pagebinder_epub::validate_book(book)?;
    println!("  Valid EPUB container: {}", book.display());
    println!("  Package:  {}", check.package_path);
    println!("  Items:    {}", check.manifest_items);
    println!("  Spine:    {}", check.spine_items);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Stage progress on an indicatif spinner; finished stages are printed above it.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl StageReporter for CliProgress {
    fn stage(&self, description: Option<&str>, phase: StagePhase) {
        let Some(description) = description else {
            return;
        };
        match phase {
            StagePhase::Started => self.spinner.set_message(format!("{description}...")),
            StagePhase::Finished => self.spinner.println(format!("  ✓ {description}")),
            StagePhase::Failed => self.spinner.println(format!("  ✗ {description}")),
        }
    }
}
