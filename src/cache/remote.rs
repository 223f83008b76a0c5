//! Distributed tier backed by an HTTP key/value cache service.
//!
//! The service speaks a small REST protocol:
//! - `PUT /set` with `{"key", "value", "ttl"}`
//! - `GET /get/:key` returning `{"key", "value"}`, 404 on a miss
//! - `DELETE /del/:key`, 404 when absent

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::cache::CacheBackend;
use crate::error::{EngineError, Result};
use crate::resources::{endpoint, parse_base_url, ResourceManager};

/// Dependency class under which the pooled client is registered.
pub const DISTRIBUTED_CACHE: &str = "distributed_cache";

#[derive(Serialize)]
struct SetBody<'a> {
    key: &'a str,
    value: &'a str,
    ttl: u64,
}

#[derive(Deserialize)]
struct GetBody {
    value: String,
}

// == Remote Backend ==
pub struct RemoteBackend {
    base_url: Url,
    resources: Arc<ResourceManager>,
}

impl RemoteBackend {
    pub fn new(base_url: &str, resources: Arc<ResourceManager>) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            resources,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.base_url, segments).map_err(unavailable)
    }
}

fn unavailable(msg: impl std::fmt::Display) -> EngineError {
    EngineError::CacheTierUnavailable(format!("{}: {}", DISTRIBUTED_CACHE, msg))
}

#[async_trait]
impl CacheBackend for RemoteBackend {
    fn name(&self) -> &str {
        DISTRIBUTED_CACHE
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let client = self.resources.with_connection(DISTRIBUTED_CACHE)?;
        let response = client
            .get(self.url(&["get", key])?)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: GetBody = response.json().await.map_err(unavailable)?;
                Ok(Some(body.value))
            }
            status => Err(unavailable(format!("GET returned {}", status))),
        }
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        let client = self.resources.with_connection(DISTRIBUTED_CACHE)?;
        let response = client
            .put(self.url(&["set"])?)
            .json(&SetBody {
                key,
                value: &value,
                ttl: ttl_secs,
            })
            .send()
            .await
            .map_err(unavailable)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unavailable(format!("PUT returned {}", response.status())))
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let client = self.resources.with_connection(DISTRIBUTED_CACHE)?;
        let response = client
            .delete(self.url(&["del", key])?)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(unavailable(format!("DELETE returned {}", status))),
        }
    }
}
