//! Crate-level error, composing the per-module errors that can surface at
//! `main`'s boundary. Control-plane errors (unknown task, schedulability,
//! invalid id, ...) never reach this type — they are always resolved into
//! a client-facing reply and never propagated. Only fatal startup paths
//! end up here.

use crate::{catalog, net};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("catalog setup failed: {0}")]
    Catalog(#[from] catalog::Error),

    #[error("network bind failed: {0}")]
    Bind(#[from] net::Error),

    #[error("failed to read config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
