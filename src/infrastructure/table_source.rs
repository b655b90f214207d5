//! Remote table access
//!
//! [`TableSource`] is the seam between pagination logic and whatever drives
//! the portal. [`HttpTableSource`] talks to it over plain HTTP with a
//! cookie-carrying client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::html_parser::parse_page_count;
use crate::infrastructure::parsing_error::ParsingError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("page count unavailable: {0}")]
    PageCount(#[from] ParsingError),

    #[error("source session is not open")]
    NotOpen,

    #[error("page {page} kept redirecting to logout after {resets} session resets")]
    SessionResetExhausted { page: u32, resets: u32 },
}

/// Operations the page fetcher needs from the remote table.
#[async_trait]
pub trait TableSource: Send {
    /// Load the landing page, establishing a fresh session.
    async fn open(&mut self) -> Result<(), SourceError>;

    /// Total number of pages, read from the currently loaded page.
    async fn page_count(&mut self) -> Result<u32, SourceError>;

    /// Move the remote table to `page` (1-based).
    async fn goto_page(&mut self, page: u32) -> Result<(), SourceError>;

    /// Location after the last navigation, including redirects.
    fn current_location(&self) -> Option<String>;

    async fn current_page_markup(&mut self) -> Result<String, SourceError>;

    async fn clear_cookies(&mut self) -> Result<(), SourceError>;

    async fn close(&mut self) -> Result<(), SourceError>;
}

#[derive(Debug, Clone)]
pub struct HttpSourceSettings {
    pub base_url: String,
    pub page_url_template: String,
    pub page_count_selector: String,
    pub user_agent: String,
    pub timeout: Duration,
}

pub struct HttpTableSource {
    settings: HttpSourceSettings,
    client: Option<Client>,
    location: Option<String>,
    markup: Option<String>,
}

impl HttpTableSource {
    pub fn new(settings: HttpSourceSettings) -> Self {
        Self {
            settings,
            client: None,
            location: None,
            markup: None,
        }
    }

    pub fn page_url(&self, page: u32) -> String {
        self.settings
            .page_url_template
            .replace("{page}", &page.to_string())
    }

    fn build_client(&self) -> Result<Client, SourceError> {
        Client::builder()
            .cookie_store(true)
            .user_agent(self.settings.user_agent.clone())
            .timeout(self.settings.timeout)
            .build()
            .map_err(|e| SourceError::Transport {
                url: self.settings.base_url.clone(),
                message: e.to_string(),
            })
    }

    async fn load(&mut self, url: &str) -> Result<(), SourceError> {
        let client = self.client.as_ref().ok_or(SourceError::NotOpen)?;
        debug!("GET {}", url);

        let response = client.get(url).send().await.map_err(|e| SourceError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| SourceError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        self.location = Some(final_url);
        self.markup = Some(body);
        Ok(())
    }
}

#[async_trait]
impl TableSource for HttpTableSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        if self.client.is_none() {
            self.client = Some(self.build_client()?);
        }
        let base = self.settings.base_url.clone();
        info!("Opening source at {}", base);
        self.load(&base).await
    }

    async fn page_count(&mut self) -> Result<u32, SourceError> {
        let markup = self.markup.as_deref().ok_or(SourceError::NotOpen)?;
        Ok(parse_page_count(markup, &self.settings.page_count_selector)?)
    }

    async fn goto_page(&mut self, page: u32) -> Result<(), SourceError> {
        let url = self.page_url(page);
        self.load(&url).await
    }

    fn current_location(&self) -> Option<String> {
        self.location.clone()
    }

    async fn current_page_markup(&mut self) -> Result<String, SourceError> {
        self.markup.clone().ok_or(SourceError::NotOpen)
    }

    async fn clear_cookies(&mut self) -> Result<(), SourceError> {
        // reqwest has no jar reset; a fresh client starts with an empty jar
        self.client = Some(self.build_client()?);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.client = None;
        self.location = None;
        self.markup = None;
        Ok(())
    }
}
