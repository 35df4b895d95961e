//! Error types shared by the scraping pipeline.

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("{site} requires SCRAPER_API_KEY (pass --allow-direct to try without the proxy)")]
    MissingApiKey { site: String },
    #[error("no terms found for {site}")]
    NoTerms { site: String },
    #[error("no term of {site} matches {query:?}")]
    UnknownTerm { site: String, query: String },
    #[error("no records scraped for {site} {term}; dataset left unchanged")]
    NoRecords { site: String, term: String },
    #[error("listing {url} could not be fetched or parsed")]
    ListingFailed { url: String },
    #[error("unit {unit} has no listing link")]
    MissingUnitLink { unit: String },
    #[error("invalid CSS selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("invalid pattern")]
    InvalidPattern(#[from] regex::Error),
    #[error("failed to parse payload from {url}")]
    PayloadParse {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
