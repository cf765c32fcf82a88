//! # download-engine
//!
//! Embeddable engine that runs resumable HTTP downloads under a concurrency cap.
//!
//! ## Design Philosophy
//!
//! download-engine is designed to be:
//! - **Bounded** - At most `max_active_downloads` transfers run; the rest wait in FIFO order
//! - **Environment-aware** - Roaming, metered networks and battery state can suspend transfers
//! - **Library-first** - Storage, transport, filesystem and environment are pluggable traits
//! - **Event-driven** - Consumers subscribe to events or register listeners, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use download_engine::utils::file_name_from_url;
//! use download_engine::{
//!     Config, DownloadEngine, EngineComponents, HttpTransport, ManualEnvironment, MemoryStore,
//!     TaskRecord,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let transport = HttpTransport::new(&config.transfer)?;
//!     let components = EngineComponents::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(transport),
//!         Arc::new(ManualEnvironment::new()),
//!     );
//!     let engine = DownloadEngine::new(config, components).await?;
//!
//!     // Subscribe to events
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let url = "https://example.com/files/archive.zip";
//!     let record = TaskRecord::new(url, "/tmp/downloads", file_name_from_url(url));
//!     engine.add(&record).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Digest verification
pub mod checksum;
/// Configuration types
pub mod config;
/// SQLite persistence layer
pub mod db;
/// Core engine implementation (decomposed into focused submodules)
pub mod engine;
/// Network and power conditions
pub mod environment;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Filesystem operations on task files
pub mod fs;
/// Listener registry
pub mod listener;
/// Post-processing pipeline
pub mod post_processing;
/// Retry classification with exponential backoff
pub mod retry;
/// Speed limiting with token bucket
pub mod speed_limiter;
/// Task record storage
pub mod store;
/// Byte transports
pub mod transport;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, SettingsUpdate};
pub use db::Database;
pub use engine::{Admission, DownloadEngine, EngineComponents, WaitQueue};
pub use environment::{Environment, EnvironmentChange, ManualEnvironment};
pub use error::{Error, PostProcessError, Result, StorageError, TransferError};
pub use extraction::{ArchiveExtractor, DefaultArchiveExtractor};
pub use fs::{FileSystem, LocalFileSystem};
pub use listener::{DownloadEngineListener, ListenerId};
pub use post_processing::PostProcessor;
pub use retry::{RetryClassifier, RetryDecision};
pub use store::{MemoryStore, TaskStore};
pub use transport::{HttpTransport, Transport};
pub use types::{ChangeableParams, Event, StatusCode, TaskId, TaskRecord};

/// Helper function to run the engine with graceful signal handling.
///
/// Waits for a termination signal and then calls the engine's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use download_engine::{
///     Config, DownloadEngine, EngineComponents, HttpTransport, ManualEnvironment, MemoryStore,
///     run_with_shutdown,
/// };
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let components = EngineComponents::new(
///         Arc::new(MemoryStore::new()),
///         Arc::new(HttpTransport::new(&config.transfer)?),
///         Arc::new(ManualEnvironment::new()),
///     );
///     let engine = DownloadEngine::new(config, components).await?;
///     engine.restore_downloads().await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(engine).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: DownloadEngine) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
