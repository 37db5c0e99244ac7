//! Errors of the outer layers. Parsing itself never fails; everything here
//! comes from files, configuration, rendering or bad command-line targets.
//!
//! Convert with `.into()` to `anyhow::Error`; callers can still
//! `downcast_ref::<Error>()` to match on the variant.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("json rendering failed")]
    Json(#[from] serde_json::Error),

    #[error("unknown output format '{0}' (expected json, dot or text)")]
    UnknownFormat(String),

    #[error("unknown view '{0}' (expected graph, tree, merge, backtrace or scope)")]
    UnknownView(String),

    /// `merge`, `backtrace` and `scope` need a signature or node id.
    #[error("view '{view}' needs --target")]
    MissingTarget { view: String },
}

pub type Result<T> = std::result::Result<T, Error>;
