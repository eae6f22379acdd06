//! Error types for fleet-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::{ReconcilerEvent, ReconcilerState};

/// A reconciler event that is not allowed from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid reconciler transition: {event:?} from {from}")]
pub struct TransitionError {
    pub from: ReconcilerState,
    pub event: ReconcilerEvent,
}

/// All errors that can arise from loading or saving the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.fleet/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
