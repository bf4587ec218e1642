//! # whispee
//!
//! Whispee server binary: opens the store, seeds chats, and serves the
//! realtime WebSocket protocol until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use whispee_server::ServerConfig;
use whispee_store::chats::ChatRepo;
use whispee_store::{Database, SqliteGateway, StorageGateway};
use whispee_telemetry::{init_telemetry, TelemetryConfig};

/// Whispee realtime chat server.
#[derive(Parser, Debug)]
#[command(name = "whispee", about = "Whispee realtime chat server")]
struct Cli {
    /// Host to bind.
    #[arg(long, env = "WHISPEE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// WebSocket/HTTP port (0 for auto-assign).
    #[arg(long, env = "WHISPEE_PORT", default_value_t = 456)]
    port: u16,

    /// Also accept-and-drop plain TCP connections on this port.
    #[arg(long)]
    legacy_port: Option<u16>,

    /// Path to the SQLite database.
    #[arg(long, env = "WHISPEE_DB")]
    db: Option<PathBuf>,

    /// Default log level; `RUST_LOG` takes precedence.
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Per-module level override, e.g. `whispee_server=debug`. Repeatable.
    #[arg(long = "module-level", value_parser = parse_module_level)]
    module_levels: Vec<(String, Level)>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,

    /// Also append logs to this file, creating its folder if needed.
    #[arg(long, env = "WHISPEE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Make sure a chat with this name exists. Repeatable.
    #[arg(long = "chat", value_name = "NAME")]
    chats: Vec<String>,

    /// Seconds to wait for connections to close on shutdown.
    #[arg(long, default_value_t = 10)]
    shutdown_timeout_secs: u64,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home)
            .join(".whispee")
            .join("database")
            .join("whispee.db")
    }

    fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(Self::default_db_path)
    }

    fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            module_levels: self.module_levels.clone(),
            json: self.log_json,
            log_file: self.log_file.clone(),
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            legacy_port: self.legacy_port,
            shutdown_timeout_secs: self.shutdown_timeout_secs,
            ..ServerConfig::default()
        }
    }
}

fn parse_module_level(raw: &str) -> Result<(String, Level), String> {
    let (module, level) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected MODULE=LEVEL, got `{raw}`"))?;
    let level = level
        .parse::<Level>()
        .map_err(|e| format!("bad level in `{raw}`: {e}"))?;
    Ok((module.to_string(), level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_telemetry(&cli.telemetry_config()).context("Failed to initialize logging")?;

    let db_path = cli.db_path();
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    let chats = ChatRepo::new(db.clone());
    for name in &cli.chats {
        let chat = chats
            .get_or_create(name)
            .with_context(|| format!("Failed to create chat `{name}`"))?;
        info!(chat_id = %chat.id, name = %chat.name, "chat ready");
    }

    let gateway: Arc<dyn StorageGateway> = Arc::new(SqliteGateway::new(db));
    let handle = whispee_server::start(cli.server_config(), gateway)
        .await
        .context("Failed to start server")?;
    info!(addr = %handle.addr, "Whispee server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    if !handle.shutdown().await {
        warn!("some connections did not close before the shutdown timeout");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["whispee"]).unwrap();
        let config = cli.server_config();
        assert_eq!(config.port, 456);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.legacy_port.is_none());
        assert_eq!(config.shutdown_timeout_secs, 10);
        assert!(cli.chats.is_empty());
        assert!(cli.db_path().ends_with(".whispee/database/whispee.db"));

        let telemetry = cli.telemetry_config();
        assert_eq!(telemetry.log_level, Level::INFO);
        assert!(!telemetry.json);
        assert!(telemetry.log_file.is_none());
    }

    #[test]
    fn flags_flow_into_configs() {
        let cli = Cli::try_parse_from([
            "whispee",
            "--port",
            "9000",
            "--legacy-port",
            "654",
            "--db",
            "/tmp/w.db",
            "--log-level",
            "debug",
            "--module-level",
            "whispee_store=warn",
            "--log-json",
            "--log-file",
            "/tmp/logs/server.log",
            "--chat",
            "general",
            "--chat",
            "random",
        ])
        .unwrap();

        let config = cli.server_config();
        assert_eq!(config.port, 9000);
        assert_eq!(config.legacy_port, Some(654));
        assert_eq!(cli.db_path(), PathBuf::from("/tmp/w.db"));
        assert_eq!(cli.chats, vec!["general", "random"]);

        let telemetry = cli.telemetry_config();
        assert_eq!(telemetry.log_level, Level::DEBUG);
        assert_eq!(telemetry.module_levels, vec![("whispee_store".to_string(), Level::WARN)]);
        assert!(telemetry.json);
        assert_eq!(telemetry.log_file, Some(PathBuf::from("/tmp/logs/server.log")));
    }

    #[test]
    fn module_level_parsing() {
        assert_eq!(
            parse_module_level("whispee_server=trace").unwrap(),
            ("whispee_server".to_string(), Level::TRACE)
        );
        assert!(parse_module_level("whispee_server").is_err());
        assert!(parse_module_level("whispee_server=loud").is_err());
    }
}
