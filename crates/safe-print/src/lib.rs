//! safe-print - Paper backups of selected KeePass secrets
//!
//! "A backup you can hold, a page that never hits the disk."
//!
//! Recovery codes and master passphrases belong on paper in a drawer, not in
//! a PDF in ~/Downloads. safe-print opens a KDBX file, picks the entries
//! tagged (or titled) with a match key, renders them into one HTML page with
//! Data Matrix barcodes, and serves that page exactly once from a loopback
//! port behind a random token. The page prints itself and tells the server
//! to shut down; if nobody asks, the server shuts down on a deadline.

pub mod browser;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod matcher;
pub mod model;
pub mod render;
pub mod server;
pub mod store;
pub mod token;

pub use config::Config;
pub use error::PrintError;
pub use lifecycle::Orchestrator;
pub use matcher::Selection;
pub use model::{Entry, Group};
pub use render::{RenderedDocument, Renderer};
pub use server::{DeliveryServer, ServerHandle, ServerState, ShutdownReason};
pub use store::{CredentialStore, KdbxFile, StoreError};
pub use token::DeliveryToken;
