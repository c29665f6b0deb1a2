// src/scrape/mod.rs
// Scraping engine proxy client and the local-fetch fallback scraper.

mod client;
mod html;
mod local_fetch;
mod spa_detector;

pub use client::ScrapeEngineClient;
pub use local_fetch::{
    formats_are_local_capable, local_scrape, LocalFetchData, LocalFetchOptions, LocalFetchOutcome,
};
pub use spa_detector::{
    detect as detect_spa_shell, MIN_MEANINGFUL_TEXT_LENGTH, SCRIPT_HEAVY_RATIO,
    SPA_LOADING_PATTERNS, SPA_ROOT_SELECTORS,
};
