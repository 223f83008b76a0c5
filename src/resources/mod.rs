//! Resources Module
//!
//! Owns pooled HTTP clients per upstream dependency and the registry of
//! background tasks, so both can be released together on shutdown.

mod manager;

pub use manager::{HousekeepingReport, PoolConfig, ResourceManager};

use reqwest::Url;

use crate::error::{EngineError, Result};

/// Parses a configured service URL that endpoint paths will be joined onto.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| EngineError::InvalidRequest(format!("bad service url {}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(EngineError::InvalidRequest(format!(
            "service url {} cannot be a base",
            raw
        )));
    }
    Ok(url)
}

/// Appends percent-encoded path segments to `base`.
pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| EngineError::InvalidRequest(format!("service url {} cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
