//! Sequential pagination over the remote table
//!
//! Pages are visited strictly in order because every jump moves shared
//! remote state. A logout redirect is recovered in place: cookies are
//! cleared, the portal is re-opened and the same page is requested again.

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::RawRow;
use crate::infrastructure::html_parser::TablePageParser;
use crate::infrastructure::parsing_error::ParsingError;
use crate::infrastructure::retry_policy::{RetryExhausted, RetryPolicy};
use crate::infrastructure::table_source::{SourceError, TableSource};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub initial_load_wait: Duration,
    pub settle_delay: Duration,
    pub reset_settle_delay: Duration,
    pub max_session_resets: u32,
    pub logout_marker: String,
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            initial_load_wait: Duration::ZERO,
            settle_delay: Duration::ZERO,
            reset_settle_delay: Duration::ZERO,
            max_session_resets: 3,
            logout_marker: "j_spring_security_logout".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PageFetchError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("page {page}: {source}")]
    RetryExhausted {
        page: u32,
        #[source]
        source: RetryExhausted,
    },

    #[error("page {page}: {source}")]
    TableMissing {
        page: u32,
        #[source]
        source: ParsingError,
    },

    #[error("cancelled before page {page}")]
    Cancelled { page: u32 },
}

/// An open connection to the remote table. Released with [`Session::close`].
pub struct Session {
    source: Box<dyn TableSource>,
}

impl Session {
    pub async fn open(mut source: Box<dyn TableSource>) -> Result<Self, SourceError> {
        source.open().await?;
        Ok(Self { source })
    }

    pub fn goto_page(&mut self, page: u32) -> BoxFuture<'_, Result<(), SourceError>> {
        self.source.goto_page(page)
    }

    pub fn is_logged_out(&self, marker: &str) -> bool {
        self.source
            .current_location()
            .is_some_and(|location| location.contains(marker))
    }

    /// Drop the session cookies and re-open the portal.
    pub async fn reset(&mut self) -> Result<(), SourceError> {
        self.source.clear_cookies().await?;
        self.source.open().await
    }

    pub async fn page_count(&mut self) -> Result<u32, SourceError> {
        self.source.page_count().await
    }

    pub async fn markup(&mut self) -> Result<String, SourceError> {
        self.source.current_page_markup().await
    }

    pub async fn close(mut self) {
        if let Err(e) = self.source.close().await {
            warn!("Failed to close source session: {}", e);
        }
    }
}

/// All rows of one run, in page order.
#[derive(Debug, Clone, Default)]
pub struct FetchedSnapshot {
    pub pages: u32,
    pub rows: Vec<RawRow>,
}

pub struct PageFetcher {
    settings: FetchSettings,
    parser: TablePageParser,
}

impl PageFetcher {
    pub fn new(settings: FetchSettings, parser: TablePageParser) -> Self {
        Self { settings, parser }
    }

    /// Open a session on `source`, read every page and close the session
    /// whatever the result.
    pub async fn fetch_snapshot(
        &self,
        source: Box<dyn TableSource>,
        cancel: &CancellationToken,
    ) -> Result<FetchedSnapshot, PageFetchError> {
        let mut session = Session::open(source).await?;
        let result = self.fetch_all(&mut session, cancel).await;
        session.close().await;
        result
    }

    pub async fn page_count(&self, session: &mut Session) -> Result<u32, PageFetchError> {
        tokio::time::sleep(self.settings.initial_load_wait).await;
        let pages = session.page_count().await?;
        info!("Source reports {} pages", pages);
        Ok(pages)
    }

    pub async fn fetch_all(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<FetchedSnapshot, PageFetchError> {
        let pages = self.page_count(session).await?;
        let mut rows = Vec::new();

        for page in 1..=pages {
            if cancel.is_cancelled() {
                warn!("Fetch cancelled before page {}/{}", page, pages);
                return Err(PageFetchError::Cancelled { page });
            }
            let page_rows = self.fetch_page(session, page).await?;
            info!("Page {}/{}: {} rows", page, pages, page_rows.len());
            rows.extend(page_rows);
        }

        Ok(FetchedSnapshot { pages, rows })
    }

    /// Fetch one page, recovering from logout redirects without advancing.
    pub async fn fetch_page(&self, session: &mut Session, page: u32) -> Result<Vec<RawRow>, PageFetchError> {
        self.jump(session, page, self.settings.settle_delay).await?;

        let mut resets = 0;
        while session.is_logged_out(&self.settings.logout_marker) {
            if resets >= self.settings.max_session_resets {
                return Err(SourceError::SessionResetExhausted { page, resets }.into());
            }
            resets += 1;
            warn!("Session reset detected on page {} (reset {})", page, resets);
            session.reset().await?;
            self.jump(session, page, self.settings.reset_settle_delay).await?;
        }

        let markup = session.markup().await?;
        self.parser
            .parse_page(&markup)
            .map_err(|source| PageFetchError::TableMissing { page, source })
    }

    async fn jump(&self, session: &mut Session, page: u32, settle: Duration) -> Result<(), PageFetchError> {
        let label = format!("jump to page {page}");
        self.settings
            .retry
            .run_with(&label, session, |s| s.goto_page(page))
            .await
            .map_err(|source| PageFetchError::RetryExhausted { page, source })?;
        debug!("Settling {:?} after {}", settle, label);
        tokio::time::sleep(settle).await;
        Ok(())
    }
}
