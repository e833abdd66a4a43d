// plan-pdf-service/src/renderers/pdf.rs

use crate::config::RendererConfig;
use crate::error::{Result, ServiceError};
use crate::renderers::engine::SharedEngine;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::LoaderId;
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, FrameId, NavigateParams, PrintToPdfParams,
    SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Flags required to run Chromium inside containers without a user namespace.
const CHROME_ARGS: [&str; 4] = [
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
];

const NETWORK_IDLE: &str = "networkIdle";

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn to_pdf(&self, html: &str) -> Result<Vec<u8>>;

    /// Release any long-lived engine resources. Safe to call more than once.
    async fn shutdown(&self) {}
}

/// Headless Chromium renderer sharing one browser process across requests.
/// Every render gets its own browser context, so pages never share cookies or storage.
pub struct ChromeRenderer {
    chrome_path: PathBuf,
    network_idle_timeout: Duration,
    engine: SharedEngine<BrowserHandle>,
}

struct BrowserHandle {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    connected: Arc<AtomicBool>,
}

impl BrowserHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.handler.is_finished()
    }
}

/// The document committed by one navigation. Lifecycle events from other
/// frames or earlier documents in the same page do not count.
#[derive(Debug, Clone, PartialEq)]
struct LoadedDocument {
    frame_id: FrameId,
    loader_id: LoaderId,
}

impl LoadedDocument {
    fn reached_network_idle(&self, event: &EventLifecycleEvent) -> bool {
        event.name == NETWORK_IDLE
            && event.frame_id == self.frame_id
            && event.loader_id == self.loader_id
    }
}

impl ChromeRenderer {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            network_idle_timeout: config.network_idle_timeout(),
            engine: SharedEngine::new(),
        }
    }

    async fn browser(&self) -> Result<Arc<BrowserHandle>> {
        self.engine
            .get_or_launch(BrowserHandle::is_connected, || self.launch())
            .await
    }

    async fn launch(&self) -> Result<BrowserHandle> {
        info!(chrome_path = %self.chrome_path.display(), "Launching headless browser");

        let config = BrowserConfig::builder()
            .chrome_executable(&self.chrome_path)
            .no_sandbox()
            .args(CHROME_ARGS)
            .build()
            .map_err(ServiceError::Render)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ServiceError::Render(format!("failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the browser connection to make progress
        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                match event {
                    Ok(()) => {}
                    Err(CdpError::Ws(e)) => {
                        error!(error = %e, "Browser connection lost");
                        break;
                    }
                    Err(e) => warn!(error = %e, "Browser handler error"),
                }
            }
            flag.store(false, Ordering::Release);
        });

        info!("Headless browser ready");

        Ok(BrowserHandle {
            browser: Mutex::new(browser),
            handler,
            connected,
        })
    }

    async fn open_page(&self, handle: &BrowserHandle) -> Result<(BrowserContextId, Page)> {
        let mut browser = handle.browser.lock().await;

        let context_id = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|e| ServiceError::Render(format!("failed to create browser context: {e}")))?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(ServiceError::Render)?;

        match browser.new_page(target).await {
            Ok(page) => Ok((context_id, page)),
            Err(e) => {
                if let Err(dispose) = browser.dispose_browser_context(context_id).await {
                    warn!(error = %dispose, "Failed to dispose browser context");
                }
                Err(ServiceError::Render(format!("failed to open page: {e}")))
            }
        }
    }

    /// Write the substituted HTML where the browser can navigate to it, so the
    /// page loads as a fresh document with its own lifecycle.
    async fn stage_document(&self, html: &str) -> Result<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix("plan-pdf-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| ServiceError::Render(format!("failed to stage html: {e}")))?;

        tokio::fs::write(file.path(), html)
            .await
            .map_err(|e| ServiceError::Render(format!("failed to stage html: {e}")))?;

        Ok(file)
    }

    async fn load(&self, page: &Page, url: String) -> Result<LoadedDocument> {
        let navigation = page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| ServiceError::Render(format!("failed to load html: {e}")))?
            .result;

        if let Some(error_text) = navigation.error_text {
            return Err(ServiceError::Render(format!("failed to load html: {error_text}")));
        }

        let loader_id = navigation.loader_id.ok_or_else(|| {
            ServiceError::Render("navigation did not create a new document".to_string())
        })?;

        Ok(LoadedDocument {
            frame_id: navigation.frame_id,
            loader_id,
        })
    }

    async fn print(&self, page: &Page, html: &str) -> Result<Vec<u8>> {
        let staged = self.stage_document(html).await?;
        let url = format!("file://{}", staged.path().display());

        let mut lifecycle = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| ServiceError::Render(format!("failed to watch page lifecycle: {e}")))?;

        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .map_err(|e| ServiceError::Render(format!("failed to enable lifecycle events: {e}")))?;

        let document = self.load(page, url).await?;

        let idle = async {
            while let Some(event) = lifecycle.next().await {
                if document.reached_network_idle(&event) {
                    return true;
                }
            }
            false
        };

        match tokio::time::timeout(self.network_idle_timeout, idle).await {
            Ok(true) => debug!("Page reached network idle"),
            Ok(false) => {
                return Err(ServiceError::Render(
                    "page closed before reaching network idle".to_string(),
                ))
            }
            Err(_) => {
                return Err(ServiceError::Render(format!(
                    "timed out after {}s waiting for network idle",
                    self.network_idle_timeout.as_secs()
                )))
            }
        }

        let params = PrintToPdfParams::builder()
            .print_background(true)
            .prefer_css_page_size(true)
            .build();

        page.pdf(params)
            .await
            .map_err(|e| ServiceError::Render(format!("failed to print pdf: {e}")))
    }

    async fn release(&self, handle: &BrowserHandle, context_id: BrowserContextId, page: Page) {
        if let Err(e) = page.close().await {
            warn!(error = %e, "Failed to close page");
        }

        let browser = handle.browser.lock().await;
        if let Err(e) = browser.dispose_browser_context(context_id).await {
            warn!(error = %e, "Failed to dispose browser context");
        }
    }
}

#[async_trait]
impl PdfRenderer for ChromeRenderer {
    #[instrument(skip_all, fields(html_kb = html.len() / 1024))]
    async fn to_pdf(&self, html: &str) -> Result<Vec<u8>> {
        let start = Instant::now();
        let handle = self.browser().await?;
        let (context_id, page) = self.open_page(&handle).await?;

        let result = self.print(&page, html).await;
        self.release(&handle, context_id, page).await;

        let pdf = result?;
        info!(
            size_kb = pdf.len() / 1024,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "PDF generated successfully"
        );

        Ok(pdf)
    }

    async fn shutdown(&self) {
        let Some(handle) = self.engine.close_once().await else {
            return;
        };

        info!("Closing headless browser");
        let mut browser = handle.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Failed to close browser cleanly");
        }
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "Failed waiting for browser exit");
        }
        handle.handler.abort();
    }
}
