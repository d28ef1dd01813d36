//! Browser Manager - Chrome lifecycle management
//!
//! Handles launching Chrome in headless mode with optimized flags,
//! browser-context creation over CDP, disconnect recovery, and the
//! page-count based restart cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::detection::{find_chrome, ChromeInfo};
use crate::error::{Result, ScrapeError};

/// Desktop user agent presented by every page
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Delay before the old browser is closed after a restart swap,
/// so in-flight requests can finish against it.
const RESTART_LINGER: Duration = Duration::from_secs(10);

/// Delay before relaunching after an unexpected disconnect.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Browser configuration options
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Manual Chrome path override
    pub chrome_path: Option<String>,
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Disable sandbox (required for Docker/root)
    pub no_sandbox: bool,
    /// Window size for consistent viewport
    pub window_size: (u32, u32),
    /// Successful pages before the browser is replaced
    pub restart_threshold: u64,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            no_sandbox: false,
            window_size: (1280, 720),
            restart_threshold: 1_000,
        }
    }
}

/// Browser lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    Uninitialized,
    Starting,
    Ready,
    Draining,
    Restarting,
    Shutdown,
}

impl std::fmt::Display for BrowserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BrowserState::Uninitialized => "uninitialized",
            BrowserState::Starting => "starting",
            BrowserState::Ready => "ready",
            BrowserState::Draining => "draining",
            BrowserState::Restarting => "restarting",
            BrowserState::Shutdown => "shutdown",
        };
        write!(f, "{}", name)
    }
}

/// A launched browser with its event-handler task
struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserHandle {
    async fn close(mut self) {
        self.handler_task.abort();
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
    }
}

struct ManagerInner {
    options: BrowserOptions,
    chrome_info: ChromeInfo,
    handle: RwLock<Option<BrowserHandle>>,
    state: std::sync::RwLock<BrowserState>,
    pages_processed: AtomicU64,
    epoch: AtomicU64,
}

/// Browser Manager - owns the process-wide Chrome instance
///
/// Cheap to clone; all clones share the same browser.
#[derive(Clone)]
pub struct BrowserManager {
    inner: Arc<ManagerInner>,
}

impl BrowserManager {
    /// Detect Chrome and prepare a manager. Does not launch the browser;
    /// call [`BrowserManager::launch`].
    pub fn new(options: BrowserOptions) -> Result<Self> {
        let chrome_info = find_chrome(options.chrome_path.as_deref())?;
        info!(
            "Using Chrome at {:?} (version: {:?})",
            chrome_info.path, chrome_info.version
        );

        Ok(Self {
            inner: Arc::new(ManagerInner {
                options,
                chrome_info,
                handle: RwLock::new(None),
                state: std::sync::RwLock::new(BrowserState::Uninitialized),
                pages_processed: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
            }),
        })
    }

    /// Build Chrome launch arguments based on options
    fn build_launch_args(options: &BrowserOptions) -> Vec<String> {
        let mut args = vec![
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-extensions".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-sync".to_string(),
            "--disable-translate".to_string(),
            "--disable-features=TranslateUI".to_string(),
            "--metrics-recording-only".to_string(),
            "--mute-audio".to_string(),
            "--disable-infobars".to_string(),
            "--disable-popup-blocking".to_string(),
            "--ignore-certificate-errors".to_string(),
            "--disable-gpu".to_string(),
            format!(
                "--window-size={},{}",
                options.window_size.0, options.window_size.1
            ),
        ];

        if options.no_sandbox {
            args.push("--no-sandbox".to_string());
            args.push("--disable-setuid-sandbox".to_string());
            args.push("--disable-dev-shm-usage".to_string());
        }

        args
    }

    /// Launch the browser and start its event-handler task.
    pub async fn launch(&self) -> Result<()> {
        {
            let state = self.state();
            if state == BrowserState::Shutdown {
                return Err(ScrapeError::PoolClosed);
            }
        }
        self.set_state(BrowserState::Starting);

        let handle = self.launch_handle().await?;
        *self.inner.handle.write().await = Some(handle);
        self.set_state(BrowserState::Ready);

        info!("Browser launched successfully");
        Ok(())
    }

    fn launch_handle(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<BrowserHandle>> + Send + '_>>
    {
        Box::pin(async move {
            let options = &self.inner.options;
            let args = Self::build_launch_args(options);
            debug!("Chrome launch args: {:?}", args);

            let mut builder = BrowserConfig::builder()
                .chrome_executable(&self.inner.chrome_info.path)
                .args(args)
                .viewport(None);
            if !options.headless {
                builder = builder.with_head();
            }
            let config = builder
                .build()
                .map_err(|e| ScrapeError::BrowserLaunchFailed { reason: e })?;

            let (browser, mut handler) =
                Browser::launch(config)
                    .await
                    .map_err(|e| ScrapeError::BrowserLaunchFailed {
                        reason: e.to_string(),
                    })?;

            // Launch generation, so stale disconnect notifications are ignored.
            let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

            // Drive browser events until the connection drops, then recover.
            let manager = self.clone();
            let handler_task = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        debug!("Browser event error: {}", e);
                    }
                }
                manager.on_disconnect(epoch).await;
            });

            Ok(BrowserHandle {
                browser,
                handler_task,
            })
        })
    }

    /// Disconnect recovery: relaunch after a short delay unless the
    /// disconnect was expected (shutdown or an already-superseded epoch).
    async fn on_disconnect(&self, epoch: u64) {
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        if self.state() == BrowserState::Shutdown {
            return;
        }

        warn!("Browser disconnected unexpectedly, relaunching in 1s");
        self.set_state(BrowserState::Restarting);
        tokio::time::sleep(RECONNECT_DELAY).await;

        if self.state() == BrowserState::Shutdown {
            return;
        }
        match self.launch_handle().await {
            Ok(handle) => {
                let old = self.inner.handle.write().await.replace(handle);
                self.set_state(BrowserState::Ready);
                info!("Browser relaunched after disconnect");
                if let Some(old) = old {
                    // This runs on the old handle's own handler task, which
                    // close() aborts, so the close must happen elsewhere.
                    tokio::spawn(async move { old.close().await });
                }
            }
            Err(e) => {
                warn!("Failed to relaunch browser after disconnect: {}", e);
            }
        }
    }

    /// Replace the browser: the replacement is launched first, the old
    /// instance lingers for [`RESTART_LINGER`] so in-flight pages finish.
    pub async fn restart(&self) -> Result<()> {
        if self.state() == BrowserState::Shutdown {
            return Err(ScrapeError::PoolClosed);
        }

        info!(
            "Restarting browser after {} pages",
            self.pages_processed()
        );
        self.set_state(BrowserState::Restarting);

        let replacement = self.launch_handle().await?;
        let old = self.inner.handle.write().await.replace(replacement);
        self.inner.pages_processed.store(0, Ordering::SeqCst);
        self.set_state(BrowserState::Ready);

        if let Some(old) = old {
            tokio::spawn(async move {
                tokio::time::sleep(RESTART_LINGER).await;
                old.close().await;
                debug!("Old browser instance closed after restart linger");
            });
        }

        Ok(())
    }

    /// Create an isolated browser context (own cookies, storage, cache).
    pub async fn new_context(&self) -> Result<BrowserContextId> {
        let guard = self.inner.handle.read().await;
        let handle = guard.as_ref().ok_or(ScrapeError::PoolClosed)?;
        let id = handle
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await?;
        Ok(id)
    }

    /// Create a blank page inside the given context (or the default one).
    pub async fn new_page(&self, context_id: Option<&BrowserContextId>) -> Result<Page> {
        let guard = self.inner.handle.read().await;
        let handle = guard.as_ref().ok_or(ScrapeError::PoolClosed)?;

        let mut builder = CreateTargetParams::builder().url("about:blank");
        if let Some(id) = context_id {
            builder = builder.browser_context_id(id.clone());
        }
        let params = builder
            .build()
            .map_err(|e| ScrapeError::Browser { reason: e })?;

        let page = handle.browser.new_page(params).await?;
        Ok(page)
    }

    /// Dispose a browser context; errors are swallowed since the context
    /// may already be gone with its browser.
    pub async fn dispose_context(&self, context_id: BrowserContextId) {
        let guard = self.inner.handle.read().await;
        if let Some(handle) = guard.as_ref() {
            let params = DisposeBrowserContextParams::builder()
                .browser_context_id(context_id)
                .build();
            match params {
                Ok(params) => {
                    if let Err(e) = handle.browser.execute(params).await {
                        debug!("Failed to dispose browser context: {}", e);
                    }
                }
                Err(e) => debug!("Failed to build dispose params: {}", e),
            }
        }
    }

    /// Record one successfully processed page. Returns true when the
    /// restart threshold has been crossed by this increment.
    pub fn record_page_processed(&self) -> bool {
        let count = self.inner.pages_processed.fetch_add(1, Ordering::SeqCst) + 1;
        count == self.inner.options.restart_threshold
    }

    pub fn pages_processed(&self) -> u64 {
        self.inner.pages_processed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BrowserState {
        *self.inner.state.read().expect("state lock poisoned")
    }

    pub(crate) fn set_state(&self, state: BrowserState) {
        *self.inner.state.write().expect("state lock poisoned") = state;
    }

    /// Advisory connectivity check.
    pub async fn is_connected(&self) -> bool {
        self.inner.handle.read().await.is_some() && self.state() == BrowserState::Ready
    }

    /// Get Chrome installation info
    pub fn chrome_info(&self) -> &ChromeInfo {
        &self.inner.chrome_info
    }

    /// Close the browser gracefully; further launches are refused.
    pub async fn close(&self) {
        self.set_state(BrowserState::Shutdown);
        if let Some(handle) = self.inner.handle.write().await.take() {
            handle.close().await;
        }
        info!("Browser closed");
    }
}

impl std::fmt::Debug for BrowserManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserManager")
            .field("chrome_info", &self.inner.chrome_info)
            .field("state", &self.state())
            .field("pages_processed", &self.pages_processed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_browser_options() {
        let opts = BrowserOptions::default();
        assert!(opts.headless);
        assert!(!opts.no_sandbox);
        assert_eq!(opts.window_size, (1280, 720));
        assert_eq!(opts.restart_threshold, 1_000);
    }

    #[test]
    fn test_build_launch_args_headless() {
        let opts = BrowserOptions::default();
        let args = BrowserManager::build_launch_args(&opts);

        assert!(args.iter().any(|a| a == "--no-first-run"));
        assert!(args.iter().any(|a| a == "--ignore-certificate-errors"));
        assert!(args.iter().any(|a| a == "--window-size=1280,720"));
    }

    #[test]
    fn test_build_launch_args_docker() {
        let opts = BrowserOptions {
            no_sandbox: true,
            ..Default::default()
        };
        let args = BrowserManager::build_launch_args(&opts);

        assert!(args.iter().any(|a| a == "--no-sandbox"));
        assert!(args.iter().any(|a| a == "--disable-dev-shm-usage"));
    }

    #[test]
    fn test_browser_state_display() {
        assert_eq!(BrowserState::Ready.to_string(), "ready");
        assert_eq!(BrowserState::Draining.to_string(), "draining");
        assert_eq!(BrowserState::Shutdown.to_string(), "shutdown");
    }
}
