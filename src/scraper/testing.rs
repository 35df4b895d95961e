//! Canned page source for unit tests.

use crate::scraper::fetcher::{PageKind, PageSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Serves bodies by exact URL and records every request.
#[derive(Debug, Default)]
pub struct CannedPages {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl CannedPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for CannedPages {
    async fn fetch_page(&self, url: &str, _kind: PageKind) -> Option<String> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned()
    }
}
