//! Browser launch

use tracing::warn;

/// Opens a URL for the operator. Best effort: failures are logged, never
/// propagated, since the URL is also printed to the console.
pub trait Launcher: Send + Sync {
    fn launch(&self, url: &str);
}

/// The desktop's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl Launcher for SystemBrowser {
    fn launch(&self, url: &str) {
        if let Err(e) = open::that(url) {
            warn!("could not open browser: {}", e);
        }
    }
}

/// Leaves opening the URL to the operator
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBrowser;

impl Launcher for NoBrowser {
    fn launch(&self, _url: &str) {}
}
