//! Application state for the inference server
//!
//! The predictor and its catalog are loaded once at startup and never
//! mutated afterwards, so they are shared across request handlers without
//! locking.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use theraphosid::backend::{default_device, DefaultBackend};
use theraphosid::inference::{ensure_checkpoint, Predictor};
use theraphosid::training::CheckpointMeta;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Checkpoint stem to serve (`<stem>.mpk` + `<stem>.json`)
    pub checkpoint_stem: PathBuf,
    /// Optional URL to fetch the checkpoint weights from on first start
    pub model_url: Option<String>,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// The loaded model; read-only for the process lifetime
    pub predictor: Predictor<DefaultBackend>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    /// Fetch the checkpoint if configured, then load the predictor.
    ///
    /// Fails before the server binds when the checkpoint is missing or its
    /// catalog does not match the model, so a broken model is never served.
    pub fn new(config: ServerConfig) -> theraphosid::Result<Self> {
        if let Some(url) = &config.model_url {
            let weights = CheckpointMeta::weights_path(&config.checkpoint_stem);
            ensure_checkpoint(url, &weights)?;
        }

        let predictor = Predictor::load(&config.checkpoint_stem, default_device())?;

        Ok(Self {
            config,
            predictor,
            started_at: Instant::now(),
        })
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
