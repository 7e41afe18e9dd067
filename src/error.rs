//! Error types for the configuration generators.
//!
//! Configuration problems are fatal and surface at construction or render
//! time. Everything that happens while applying a config (failed checks,
//! failed reloads) is logged by the generators instead of returned.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("{proxy} requires a {section} section")]
    MissingSection {
        proxy: &'static str,
        section: &'static str,
    },

    #[error("the {missing:?} option(s) are required when `{condition}` is true")]
    MissingOptions {
        condition: &'static str,
        missing: Vec<&'static str>,
    },

    #[error("invalid value for `{option}`: {message}")]
    InvalidOption {
        option: &'static str,
        message: String,
    },

    #[error("watcher {watcher}: '{mode}' is not a known service mode (expected http or tcp)")]
    UnknownMode { watcher: String, mode: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GeneratorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GeneratorError>;
