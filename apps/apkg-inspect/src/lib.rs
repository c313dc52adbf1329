//! Command-line inspector for Anki deck packages.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apkg_core::{ApkgParseResult, ImportConfig, ImportError};

/// Command-line arguments for apkg-inspect
#[derive(Parser, Debug)]
#[command(name = "apkg-inspect")]
#[command(about = "Import an Anki .apkg file and summarize its decks")]
#[command(version)]
pub struct Args {
    /// Path to the .apkg file
    #[arg(env = "APKG_FILE")]
    pub file: PathBuf,

    /// Print the full result as JSON
    #[arg(long, env = "APKG_JSON")]
    pub json: bool,

    /// Fail on notes whose field count differs from their model
    #[arg(long, env = "APKG_STRICT")]
    pub strict: bool,

    /// JSON file with import settings; flags override its values
    #[arg(long, env = "APKG_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "APKG_MAX_ARCHIVE_BYTES")]
    pub max_archive_bytes: Option<u64>,

    #[arg(long, env = "APKG_MAX_NOTES")]
    pub max_notes: Option<usize>,

    #[arg(long, env = "APKG_MAX_MEDIA")]
    pub max_media: Option<usize>,

    /// Abort the import after this many seconds
    #[arg(long, default_value = "60", env = "APKG_TIMEOUT_SECS")]
    pub timeout_secs: u64,
}

impl Args {
    /// Defaults, then the config file, then flags.
    pub fn import_config(&self) -> anyhow::Result<ImportConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => ImportConfig::default(),
        };
        if let Some(max) = self.max_archive_bytes {
            config.max_archive_bytes = max;
        }
        if let Some(max) = self.max_notes {
            config.max_note_count = max;
        }
        if let Some(max) = self.max_media {
            config.max_media_count = max;
        }
        if self.strict {
            config.strict_field_counts = true;
        }
        Ok(config)
    }
}

/// Run the import on a blocking thread, giving up after `timeout`.
///
/// A timeout is reported as `ResourceLimitExceeded` on `timeout_secs`.
pub async fn import_with_timeout(
    bytes: Vec<u8>,
    config: ImportConfig,
    timeout: Duration,
) -> anyhow::Result<ApkgParseResult> {
    let started = Instant::now();
    let task = tokio::task::spawn_blocking(move || apkg_core::import(&bytes, &config));
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => Ok(joined.context("import task panicked")??),
        Err(_) => Err(ImportError::ResourceLimitExceeded {
            limit: "timeout_secs",
            max: timeout.as_secs(),
            found: started.elapsed().as_secs(),
        }
        .into()),
    }
}

/// Human-readable summary: one line per deck, then warnings.
pub fn render_summary(result: &ApkgParseResult) -> String {
    let mut out = format!(
        "format: {:?}\ndecks: {}  cards: {}  media: {}  warnings: {}\n",
        result.format,
        result.decks.len(),
        result.card_count(),
        result.media.len(),
        result.warnings.len()
    );
    for deck in &result.decks {
        let depth = deck.path.len().saturating_sub(1);
        out.push_str(&format!(
            "{}{} ({} cards)\n",
            "  ".repeat(depth),
            deck.name,
            deck.cards.len()
        ));
    }
    for warning in &result.warnings {
        out.push_str(&format!("warning[{:?}]: {}\n", warning.kind, warning.context));
    }
    out
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.import_config()?;

    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    tracing::info!("Importing {} ({} bytes)", args.file.display(), bytes.len());

    let result = import_with_timeout(bytes, config, Duration::from_secs(args.timeout_secs))
        .await
        .map_err(|err| {
            if let Some(import_err) = err.downcast_ref::<ImportError>() {
                tracing::error!(kind = ?import_err.kind(), "import failed: {}", import_err);
            }
            err
        })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_summary(&result));
    }
    Ok(())
}
