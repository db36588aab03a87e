//! nullshare: ephemeral end-to-end encrypted file transfer
//!
//! Commands:
//!   send <path> [--type <mime>] [--delete-source]
//!                                   - encrypt, upload and print a share link
//!   receive <link> [--out <dir>]    - download, decrypt and save a file
//!   inspect <transfer-id>           - show a transfer record without downloading
//!   status                          - check storage reachability
//!   config show                     - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nullshare_core::config::{NullshareConfig, StorageBackend};
use nullshare_core::{ErrorKind, RecordState, TransferError, TransferId};
use nullshare_storage::{
    check_health, MetadataStore, OperatorBlobStore, OperatorRecordBackend, S3Credentials,
};
use nullshare_transfer::{StageFn, TransferEngine, TransferLink};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "nullshare",
    version,
    about = "Ephemeral end-to-end encrypted file transfer",
    long_about = "nullshare: share files as encrypted, self-expiring links. \
                  The decryption key travels only inside the link."
)]
struct Cli {
    /// Path to the nullshare config file
    #[arg(
        long,
        short = 'c',
        env = "NULLSHARE_CONFIG",
        default_value = "~/.config/nullshare/config.toml"
    )]
    config: PathBuf,

    /// Log filter (overrides log_level in config; RUST_LOG wins over both)
    #[arg(long, env = "NULLSHARE_LOG")]
    log: Option<String>,

    /// Log format (overrides log_format in config)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file, upload it and print a share link
    ///
    /// S3 credentials are read from AWS_ACCESS_KEY_ID and
    /// AWS_SECRET_ACCESS_KEY (or NULLSHARE_ACCESS_KEY_ID and
    /// NULLSHARE_SECRET_ACCESS_KEY).
    Send {
        /// Local file to send
        path: PathBuf,
        /// MIME type to record (default: sniffed from content)
        #[arg(long = "type", short = 't')]
        file_type: Option<String>,
        /// Delete the local file once the transfer is published
        #[arg(long)]
        delete_source: bool,
    },

    /// Download and decrypt a transfer from its share link
    Receive {
        /// Share link (nullshare://d/{id}#key={hex})
        link: String,
        /// Output directory (default: receive.output_dir from config)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Show a transfer record without downloading it
    Inspect {
        /// Transfer id (UUID)
        transfer_id: String,
    },

    /// Check that storage is reachable
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {}", user_message(&e));
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path).await?;

    let level = cli.log.as_deref().unwrap_or(&config.log_level);
    let format = cli.log_format.clone().unwrap_or(match config.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(level, &format);

    config.validate()?;

    match cli.command {
        Commands::Send {
            path,
            file_type,
            delete_source,
        } => cmd_send(&config, &path, file_type.as_deref(), delete_source).await,
        Commands::Receive { link, out } => cmd_receive(&config, &link, out.as_deref()).await,
        Commands::Inspect { transfer_id } => cmd_inspect(&config, &transfer_id).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

/// Logs go to stderr so stdout carries only command output (the link).
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Error reporting ───────────────────────────────────────────────────────────

fn user_message(err: &anyhow::Error) -> String {
    let Some(e) = err.downcast_ref::<TransferError>() else {
        return format!("{err:#}");
    };
    match e.kind() {
        ErrorKind::DecryptFailure => {
            "could not decrypt this file: the link's key is wrong or the data is corrupted".into()
        }
        ErrorKind::NotFound => {
            "this transfer does not exist (check the link, or it was never published)".into()
        }
        ErrorKind::Expired => format!("this transfer has expired and can no longer be downloaded ({e})"),
        ErrorKind::QuotaExceeded => {
            format!("this transfer has used up its downloads ({e})")
        }
        ErrorKind::InvalidLink => format!("not a nullshare link: {e}"),
        ErrorKind::Storage => format!("storage unavailable, try again later: {e}"),
        ErrorKind::Persistence => format!("transfer records unavailable, try again later: {e}"),
        ErrorKind::Crypto
        | ErrorKind::InvalidInput
        | ErrorKind::Config
        | ErrorKind::Io => format!("{err:#}"),
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<TransferError>().map(TransferError::kind) {
        Some(ErrorKind::DecryptFailure) => 3,
        Some(ErrorKind::NotFound | ErrorKind::Expired | ErrorKind::QuotaExceeded) => 4,
        Some(ErrorKind::InvalidLink | ErrorKind::InvalidInput) => 2,
        _ => 1,
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<NullshareConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(NullshareConfig::default())
    }
}

// ── Storage from config + environment credentials ─────────────────────────────

/// Read S3 credentials from AWS_* variables, falling back to NULLSHARE_*.
fn s3_credentials_from_env() -> Result<S3Credentials> {
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("NULLSHARE_ACCESS_KEY_ID"))
        .context(
            "S3 credentials not set\n\
             Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
             Example:\n\
             \texport AWS_ACCESS_KEY_ID=your-key\n\
             \texport AWS_SECRET_ACCESS_KEY=your-secret",
        )?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("NULLSHARE_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;

    Ok(S3Credentials {
        access_key_id,
        secret_access_key: SecretString::from(secret_access_key),
    })
}

fn build_operator(config: &NullshareConfig) -> Result<opendal::Operator> {
    let mut storage = config.storage.clone();
    storage.root = expand_tilde(&storage.root);

    let credentials = match storage.backend {
        StorageBackend::S3 => Some(s3_credentials_from_env()?),
        StorageBackend::Fs => None,
        StorageBackend::Memory => {
            tracing::warn!("memory backend selected; transfers vanish when this process exits");
            None
        }
    };

    nullshare_storage::build_from_core_config(&storage, credentials)
        .context("building storage operator")
}

fn build_engine(config: &NullshareConfig) -> Result<TransferEngine> {
    let op = build_operator(config)?;

    let records = OperatorRecordBackend::new(op.clone(), &config.metadata.prefix);
    let metadata = MetadataStore::new(Arc::new(records), config.policy());
    let blobs = OperatorBlobStore::new(op, &config.storage.blob_prefix)
        .with_public_url(&config.storage.public_url);

    Ok(TransferEngine::new(metadata, Arc::new(blobs)))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn stage_reporter(pb: &ProgressBar) -> StageFn {
    let pb = pb.clone();
    Box::new(move |stage| pb.set_message(stage.describe()))
}

// ── `nullshare send` ──────────────────────────────────────────────────────────

async fn cmd_send(
    config: &NullshareConfig,
    path: &Path,
    file_type: Option<&str>,
    delete_source: bool,
) -> Result<()> {
    if !path.is_file() {
        return Err(TransferError::InvalidInput(format!("not a file: {}", path.display())).into());
    }
    let engine = build_engine(config)?;

    let pb = make_spinner("send");
    let progress = stage_reporter(&pb);
    let result = engine.send_path(path, file_type, delete_source, Some(&progress)).await;
    pb.finish_and_clear();
    let sent = result?;

    println!("{}", sent.link);
    eprintln!();
    eprintln!("  transfer:   {}", sent.transfer_id);
    eprintln!("  file:       {} ({})", sent.record.file_name, sent.record.file_type);
    eprintln!("  size:       {}", fmt_bytes(sent.record.size));
    eprintln!("  downloads:  {}", sent.record.max_downloads);
    eprintln!("  expires:    {}", sent.record.expires_at.to_rfc3339());
    if delete_source {
        let state = if path.exists() { "kept (removal failed)" } else { "removed" };
        eprintln!("  source:     {state}");
    }
    eprintln!();
    eprintln!("Anyone holding this link can decrypt the file. Share it privately.");

    Ok(())
}

// ── `nullshare receive` ───────────────────────────────────────────────────────

async fn cmd_receive(config: &NullshareConfig, link: &str, out: Option<&Path>) -> Result<()> {
    let link: TransferLink = link.parse()?;
    let dir = expand_tilde(out.unwrap_or(&config.receive.output_dir));
    let engine = build_engine(config)?;

    let pb = make_spinner("receive");
    let progress = stage_reporter(&pb);
    let result = engine.receive_to_dir(&link, &dir, Some(&progress)).await;
    pb.finish_and_clear();
    let saved = result?;

    let size = tokio::fs::metadata(&saved)
        .await
        .map(|m| m.len())
        .unwrap_or_default();
    println!("Received: {} ({})", saved.display(), fmt_bytes(size));

    Ok(())
}

// ── `nullshare inspect` ───────────────────────────────────────────────────────

async fn cmd_inspect(config: &NullshareConfig, transfer_id: &str) -> Result<()> {
    let id: TransferId = transfer_id
        .parse()
        .map_err(|e| TransferError::InvalidInput(format!("bad transfer id {transfer_id:?}: {e}")))?;
    let engine = build_engine(config)?;

    let status = engine.metadata().inspect(&id).await?;
    let record = &status.record;
    let state = match status.state {
        RecordState::Active => "active",
        RecordState::Expired => "expired",
        RecordState::Exhausted => "exhausted",
    };

    println!("transfer {}", status.id);
    println!("  state:      {state}");
    println!("  file:       {} ({})", record.file_name, record.file_type);
    println!("  size:       {}", fmt_bytes(record.size));
    println!(
        "  downloads:  {}/{} ({} remaining)",
        record.download_count,
        record.max_downloads,
        status.remaining_downloads()
    );
    println!("  created:    {}", record.created_at.to_rfc3339());
    println!("  expires:    {}", record.expires_at.to_rfc3339());
    if status.state == RecordState::Active {
        println!(
            "  time left:  {}",
            fmt_remaining(record.expires_at - status.checked_at)
        );
    }

    Ok(())
}

// ── `nullshare status` ────────────────────────────────────────────────────────

async fn cmd_status(config: &NullshareConfig) -> Result<()> {
    let storage = &config.storage;
    let op = build_operator(config)?;

    match storage.backend {
        StorageBackend::S3 => {
            println!("storage:    s3 {} [{}]", storage.endpoint, storage.bucket);
            println!("  tls:      {}", if storage.endpoint.starts_with("https://") { "yes" } else { "no" });
        }
        StorageBackend::Fs => {
            println!("storage:    fs {}", expand_tilde(&storage.root).display());
        }
        StorageBackend::Memory => println!("storage:    memory"),
    }
    println!("  blobs:    {}/", storage.blob_prefix);
    println!("  records:  {}/", config.metadata.prefix);
    println!(
        "policy:     {} downloads, {}h lifetime",
        config.transfer.max_downloads, config.transfer.ttl_hours
    );

    check_health(&op).await?;
    println!("health:     ok");

    Ok(())
}

// ── `nullshare config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &NullshareConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_remaining(left: chrono::Duration) -> String {
    let minutes = left.num_minutes().max(0);
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_and_receive() {
        let cli = Cli::try_parse_from(["nullshare", "send", "a.pdf", "--type", "application/pdf"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Send { ref file_type, delete_source: false, .. }
                if file_type.as_deref() == Some("application/pdf")
        ));

        let cli = Cli::try_parse_from(["nullshare", "send", "a.pdf", "--delete-source"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Send { delete_source: true, .. }
        ));

        let cli = Cli::try_parse_from([
            "nullshare",
            "--log-format",
            "json",
            "receive",
            "nullshare://d/x#key=y",
            "-o",
            "/tmp/in",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
        assert!(matches!(cli.command, Commands::Receive { out: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_load_config_missing_file_gives_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.transfer.max_downloads, 5);
    }

    #[tokio::test]
    async fn test_load_config_reads_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[transfer]\nmax_downloads = 2\n").unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.transfer.max_downloads, 2);
        assert_eq!(config.transfer.ttl_hours, 24);

        std::fs::write(&path, "[transfer\n").unwrap();
        assert!(load_config(&path).await.is_err());
    }

    #[test]
    fn test_error_messages_distinct_per_kind() {
        let id = TransferId::new();
        let errors: Vec<anyhow::Error> = vec![
            TransferError::DecryptFailure.into(),
            TransferError::NotFound(id).into(),
            TransferError::Expired {
                id,
                expired_at: chrono::Utc::now(),
            }
            .into(),
            TransferError::QuotaExceeded {
                id,
                max_downloads: 5,
            }
            .into(),
        ];
        let messages: Vec<String> = errors.iter().map(user_message).collect();
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(exit_code(&errors[0]), 3);
        assert_eq!(exit_code(&errors[1]), 4);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_tilde(Path::new("~/.config/nullshare/config.toml")),
            PathBuf::from("/home/tester/.config/nullshare/config.toml")
        );
        assert_eq!(expand_tilde(Path::new("/etc/x")), PathBuf::from("/etc/x"));
    }

    #[test]
    fn test_fmt_helpers() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_remaining(chrono::Duration::minutes(125)), "2h 5m");
        assert_eq!(fmt_remaining(chrono::Duration::minutes(-3)), "0m");
    }
}
