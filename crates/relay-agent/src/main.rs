//! # push-relay
//!
//! Relay binary: loads settings, opens the registration store, restores
//! every stored connection, and serves the registration API until
//! interrupted.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::logging::{LogFormat, init_subscriber};
use relay_runtime::{ConnectionManager, FcmClient, PushGateway, StreamConfig, reconcile};
use relay_server::RelayServer;
use relay_settings::{Directory, RelaySettings, load_settings_from_path};
use relay_store::{ConnectionConfig, RegistrationStore, SqliteRegistrationStore};

/// Streaming-to-push notification relay.
#[derive(Parser, Debug)]
#[command(name = "push-relay", about = "Relay streaming notifications to push devices")]
struct Cli {
    /// Settings file (JSON). Missing file means defaults.
    #[arg(long, default_value = "db/settings.json")]
    settings: PathBuf,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<String>,
}

impl Cli {
    /// Load settings and apply command-line overrides on top.
    fn resolve_settings(&self) -> Result<RelaySettings> {
        let mut settings = load_settings_from_path(&self.settings)
            .with_context(|| format!("Failed to load settings from {}", self.settings.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db_path) = &self.db_path {
            settings.database.path.clone_from(db_path);
        }
        Ok(settings)
    }
}

fn open_store(settings: &RelaySettings) -> Result<SqliteRegistrationStore> {
    let config = ConnectionConfig {
        pool_size: settings.database.pool_size,
        ..ConnectionConfig::default()
    };
    let pool = relay_store::new_file(&settings.database.path, &config)
        .with_context(|| format!("Failed to open database {}", settings.database.path))?;
    SqliteRegistrationStore::open(pool).context("Failed to migrate database")
}

fn load_directory(settings: &RelaySettings) -> Result<Directory> {
    let apps = Path::new(&settings.directory.app_map_path);
    let instances = Path::new(&settings.directory.instance_map_path);
    Directory::load(apps, instances).with_context(|| {
        format!(
            "Failed to load {} / {}",
            apps.display(),
            instances.display()
        )
    })
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let _ = sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let store: Arc<dyn RegistrationStore> = Arc::new(open_store(&settings)?);
    let directory = load_directory(&settings)?;
    let gateway: Arc<dyn PushGateway> = Arc::new(
        FcmClient::from_settings(&settings.push).context("Failed to build push client")?,
    );

    let manager = ConnectionManager::new(
        Arc::clone(&store),
        gateway,
        StreamConfig::from_settings(&settings.stream),
    );
    let report = reconcile(store.as_ref(), &manager).context("Failed to restore registrations")?;
    tracing::info!(
        restored = report.started,
        failed = report.failed,
        "stored registrations restored"
    );

    let server = RelayServer::new(Arc::clone(&manager), store, directory);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let shutdown = Arc::clone(server.shutdown());
    let _signal = tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.shutdown();
    });

    server.serve(listener).await.context("Server error")?;

    tracing::info!("Shutting down...");
    manager.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["push-relay"]);
        assert_eq!(cli.settings, PathBuf::from("db/settings.json"));
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.db_path.is_none());
    }

    #[test]
    fn cli_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 8080, "host": "127.0.0.1"}}"#).unwrap();

        let cli = Cli::parse_from([
            "push-relay",
            "--settings",
            path.to_str().unwrap(),
            "--port",
            "9000",
            "--db-path",
            "/tmp/relay.sqlite",
        ]);
        let settings = cli.resolve_settings().unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.database.path, "/tmp/relay.sqlite");
    }

    #[test]
    fn bad_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{").unwrap();
        let cli = Cli::parse_from(["push-relay", "--settings", path.to_str().unwrap()]);
        assert!(cli.resolve_settings().is_err());
    }

    #[test]
    fn store_and_directory_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        let apps = dir.path().join("app_map.json");
        let instances = dir.path().join("instance_map.json");
        std::fs::write(&apps, r#"{"tusky": {"firebase_key": "key1"}}"#).unwrap();
        std::fs::write(&instances, r#"{"*": {}}"#).unwrap();

        let mut settings = RelaySettings::default();
        settings.database.path = dir.path().join("db").join("relay.sqlite").display().to_string();
        settings.directory.app_map_path = apps.display().to_string();
        settings.directory.instance_map_path = instances.display().to_string();

        let store = open_store(&settings).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        let directory = load_directory(&settings).unwrap();
        assert_eq!(directory.resolve_app_key(Some("tusky")), Ok("key1"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = RelaySettings::default();
        settings.directory.app_map_path = dir.path().join("nope.json").display().to_string();
        assert!(load_directory(&settings).is_err());
    }
}
