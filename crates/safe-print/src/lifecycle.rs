//! Print run orchestration
//!
//! A run has two halves. `prepare` decrypts, matches and renders, all
//! synchronously and before any socket exists, so a failure there leaves
//! nothing behind. `deliver` binds the server, publishes the URL, starts the
//! deadline watcher and the browser task, and serves until the listener is
//! released.

use std::sync::Arc;

use chrono::Local;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::browser::Launcher;
use crate::config::Config;
use crate::error::PrintError;
use crate::matcher::Selection;
use crate::render::{RenderedDocument, Renderer, Sheet};
use crate::server::{DeliveryServer, ShutdownReason};
use crate::store::CredentialStore;

pub struct Orchestrator {
    config: Config,
    renderer: Renderer,
    launcher: Arc<dyn Launcher>,
}

impl Orchestrator {
    pub fn new(config: Config, launcher: Arc<dyn Launcher>) -> Result<Self, PrintError> {
        config.validate()?;
        let renderer = Renderer::new(config.barcode_scale);
        Ok(Self {
            config,
            renderer,
            launcher,
        })
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decrypt the store and render the document
    pub fn prepare(
        &self,
        store: &dyn CredentialStore,
        passphrase: &str,
    ) -> Result<RenderedDocument, PrintError> {
        let groups = store.open(passphrase)?;

        let selection = Selection::find(&groups, &self.config.tag);
        info!(
            config_entry = selection.config.is_some(),
            entries = selection.entries.len(),
            "entries selected"
        );

        let sheet = Sheet::new(&store.name(), passphrase, &selection, Local::now());
        Ok(self.renderer.render(&sheet)?)
    }

    /// Serve `document` until it is closed or `deadline` passes.
    ///
    /// `on_listening` receives the document URL once the listener is bound.
    pub async fn deliver(
        &self,
        document: RenderedDocument,
        deadline: Instant,
        on_listening: impl FnOnce(&str),
    ) -> Result<ShutdownReason, PrintError> {
        if Instant::now() >= deadline {
            info!("deadline passed before the server started");
            return Ok(ShutdownReason::TimedOut);
        }

        let mut server = DeliveryServer::new(document)
            .bind()
            .await?
            .with_drain(self.config.drain());
        let handle = server.handle();
        let ready = server.ready_signal();
        let url = server.url();

        let watcher = handle.watch_deadline(deadline);
        on_listening(&url);

        let browser = if self.config.open_browser {
            let launcher = self.launcher.clone();
            let delay = self.config.browser_delay();
            Some(tokio::spawn(async move {
                if ready.await.is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
                debug!("launching browser");
                let _ = tokio::task::spawn_blocking(move || launcher.launch(&url)).await;
            }))
        } else {
            None
        };

        let result = server.serve().await;

        handle.close(ShutdownReason::Closed);
        watcher.abort();
        if let Some(browser) = browser {
            browser.abort();
        }

        let reason = result?;
        info!(state = handle.state().as_str(), "delivery finished");
        Ok(reason)
    }

    /// Both halves in one go; the deadline counts from `started`
    pub async fn run(
        &self,
        store: &dyn CredentialStore,
        passphrase: &str,
        started: Instant,
        on_listening: impl FnOnce(&str),
    ) -> Result<ShutdownReason, PrintError> {
        let document = self.prepare(store, passphrase)?;
        self.deliver(document, started + self.config.deadline(), on_listening)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::NoBrowser;
    use crate::model::{Entry, Group, PASSWORD};
    use crate::render::{Barcode, CommonMark, RenderError};
    use crate::store::MemoryStore;
    use std::time::Duration;

    struct RejectingBarcode;

    impl Barcode for RejectingBarcode {
        fn data_uri(&self, _payload: &str, _scale: u32) -> Result<String, RenderError> {
            Err(RenderError::Barcode("rejected".to_string()))
        }
    }

    fn store() -> MemoryStore {
        MemoryStore {
            name: "test.kdbx".to_string(),
            groups: vec![Group::new("Root").with_entry(
                Entry::new("VPN")
                    .with_tags("safe-print")
                    .with_field(PASSWORD, "p4ss"),
            )],
        }
    }

    fn orchestrator(config: Config) -> Orchestrator {
        Orchestrator::new(config, Arc::new(NoBrowser)).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            deadline_secs: 0,
            ..Config::default()
        };
        assert!(matches!(
            Orchestrator::new(config, Arc::new(NoBrowser)),
            Err(PrintError::Config(_))
        ));
    }

    #[test]
    fn test_oversized_deadline_rejected() {
        let config = Config {
            deadline_secs: u64::MAX / 2,
            ..Config::default()
        };
        assert!(matches!(
            Orchestrator::new(config, Arc::new(NoBrowser)),
            Err(PrintError::Config(_))
        ));
    }

    #[test]
    fn test_prepare_renders_matches() {
        let doc = orchestrator(Config::default())
            .prepare(&store(), "master")
            .unwrap();
        let html = String::from_utf8(doc.as_bytes().to_vec()).unwrap();
        assert!(html.contains("test.kdbx"));
        assert!(html.contains("VPN"));
    }

    #[tokio::test]
    async fn test_render_failure_never_listens() {
        let orchestrator = orchestrator(Config::default()).with_renderer(
            Renderer::with_collaborators(Box::new(CommonMark), Box::new(RejectingBarcode), 4),
        );

        let mut published = false;
        let result = orchestrator
            .run(&store(), "master", Instant::now(), |_| published = true)
            .await;

        assert!(matches!(result, Err(PrintError::Render(_))));
        assert!(!published);
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_server() {
        let orchestrator = orchestrator(Config::default());
        let doc = orchestrator.prepare(&store(), "master").unwrap();

        let mut published = false;
        let reason = orchestrator
            .deliver(doc, Instant::now() - Duration::from_millis(1), |_| published = true)
            .await
            .unwrap();

        assert_eq!(reason, ShutdownReason::TimedOut);
        assert!(!published);
    }

    #[tokio::test]
    async fn test_deadline_ends_delivery() {
        let orchestrator = orchestrator(Config {
            open_browser: false,
            ..Config::default()
        });
        let doc = orchestrator.prepare(&store(), "master").unwrap();

        let started = std::time::Instant::now();
        let reason = orchestrator
            .deliver(doc, Instant::now() + Duration::from_millis(100), |_| {})
            .await
            .unwrap();

        assert_eq!(reason, ShutdownReason::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
