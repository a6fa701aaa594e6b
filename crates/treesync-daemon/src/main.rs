//! TreeSync daemon - background tree synchronization service
//!
//! This binary runs as a user service and handles:
//! - Watching local directory trees for changes
//! - Persisting the tracked state to SQLite
//! - Mirroring the hierarchy into the remote object store
//! - A D-Bus interface for same-host clients
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! Startup wires the store, the remote client, and the engine together,
//! runs the bootstrap pass, then splits into three long-lived tasks: the
//! watcher event loop, the reconciler, and the D-Bus service. All of them
//! are stopped through one `CancellationToken`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use treesync_core::config::Config;
use treesync_core::ports::{IObjectStore, IStateStore};
use treesync_engine::bootstrap;
use treesync_engine::dispatcher::EventDispatcher;
use treesync_engine::queue::ActionQueue;
use treesync_engine::reconcile::Reconciler;
use treesync_engine::scanner::TreeScanner;
use treesync_engine::watcher::{ChangeEvent, PathWatcher};
use treesync_engine::working_set::WorkingSet;
use treesync_ipc::service::{DbusService, TreeSyncInterface, DBUS_NAME};
use treesync_remote::ObjectStoreClient;
use treesync_store::{DatabasePool, SqliteStateStore};

// ============================================================================
// DaemonService
// ============================================================================

/// Orchestrates the daemon's components and lifetime
struct DaemonService {
    config: Config,
    store: Arc<dyn IStateStore>,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Loads configuration and opens the database
    async fn new(shutdown: CancellationToken) -> Result<Self> {
        let config_path = Config::default_path();
        let config = Config::load_or_default(&config_path);
        info!(config_path = %config_path.display(), "Loaded configuration");

        // Invalid configuration is fatal before the watch loop starts
        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                error!(%error, "Configuration error");
            }
            anyhow::bail!("Configuration is invalid ({} errors)", errors.len());
        }

        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        let store: Arc<dyn IStateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));

        Ok(Self {
            config,
            store,
            shutdown,
        })
    }

    /// Wires everything together and runs until shutdown
    async fn run(&self) -> Result<()> {
        // Connect the remote mirror if a credential is saved; otherwise
        // run in local-tracking-only mode
        let mirror = match self.store.get_credential().await? {
            Some(credential) => {
                let client = ObjectStoreClient::new(
                    self.config.remote.base_url.clone(),
                    credential.value.clone(),
                );
                bootstrap::connect_remote(
                    Arc::clone(&self.store),
                    Arc::new(client) as Arc<dyn IObjectStore>,
                    &self.config.remote.device_root_name,
                )
                .await
                .context("Remote bootstrap failed")?
                .map(Arc::new)
            }
            None => {
                info!("No credential saved, running in local-tracking-only mode");
                None
            }
        };

        let set = WorkingSet::spawn();
        let scanner = TreeScanner::new(set.clone());
        let queue = Arc::new(ActionQueue::new(self.config.watch.action_queue_capacity));
        let (watcher, event_rx) = PathWatcher::new(self.config.watch.event_channel_capacity)
            .context("Failed to initialize filesystem watcher")?;
        let watcher = Arc::new(watcher);

        // One full convergence pass before live events start flowing
        bootstrap::startup_pass(&set, &self.store, mirror.as_ref(), &scanner, &queue)
            .await
            .context("Startup pass failed")?;

        // D-Bus surface; the well-known name doubles as the single-instance
        // lock
        let interface = TreeSyncInterface::new(
            Arc::clone(&self.store),
            set.clone(),
            scanner.clone(),
            Arc::clone(&queue),
        );
        let mut dbus = DbusService::new(interface);
        let _dbus_connection = dbus
            .start()
            .await
            .with_context(|| format!("Failed to acquire D-Bus name {DBUS_NAME}"))?;

        // Reconciler consumer loop
        let reconciler = Arc::new(Reconciler::new(
            set.clone(),
            Arc::clone(&self.store),
            Arc::clone(&watcher),
            mirror,
            Arc::clone(&queue),
        ));
        let reconciler_task = tokio::spawn(
            Arc::clone(&reconciler).run(self.shutdown.child_token()),
        );

        // Watcher event loop
        let dispatcher = EventDispatcher::new(set, scanner, queue);
        self.event_loop(dispatcher, event_rx).await;

        // Shutdown: stop the watcher exactly once, then wait for the
        // reconciler to drain out
        watcher.close();
        if let Err(e) = reconciler_task.await {
            warn!(error = %e, "Reconciler task ended abnormally");
        }

        Ok(())
    }

    /// Pulls watcher events and hands each to its own handler task
    async fn event_loop(
        &self,
        dispatcher: EventDispatcher,
        mut event_rx: tokio::sync::mpsc::Receiver<ChangeEvent>,
    ) {
        info!("Event loop started");
        loop {
            let event = tokio::select! {
                event = event_rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        warn!("Watcher event channel closed");
                        break;
                    }
                },
                _ = self.shutdown.cancelled() => break,
            };

            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher.handle(event).await {
                    error!(error = %e, "Event handler failed");
                }
            });
        }
        info!("Event loop stopped");
    }
}

// ============================================================================
// Signal handling
// ============================================================================

/// Waits for SIGTERM or SIGINT and cancels the token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise the configured level seeds the filter
    let config = Config::load_or_default(&Config::default_path());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!("TreeSync daemon starting (treesyncd)");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(shutdown_token.clone()).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("TreeSync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "TreeSync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_child_propagation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_empty());
        assert!(config.watch.event_channel_capacity > 0);
    }

    #[test]
    fn test_config_default_path_is_nonempty() {
        assert!(!Config::default_path().as_os_str().is_empty());
    }
}
