//! Run-level errors
//!
//! Every fatal failure of a print run ends up here. Per-request problems stay
//! inside the server and never reach this type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::render::RenderError;
use crate::server::ServerError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PrintError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Server(#[from] ServerError),
}
