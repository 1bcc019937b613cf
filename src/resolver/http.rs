//! HTTP-backed resolver for real timeline hosts.
//!
//! Wire conventions:
//! - `GET <timeline-uri>` returns the timeline's `Manifest` as JSON.
//! - `GET <timeline-uri>/removed` returns a JSON array of retracted
//!   identities; a 404 means the host keeps no retraction list.
//! - `GET <descending.iterator>?until=<unix-seconds>` returns an opaque
//!   cursor token as a JSON string; a 404 means no chunk covers the instant.
//! - `GET <descending.body>?cursor=<token>` returns a `ChunkBody` as JSON;
//!   a 404 means the chunk expired between lookup and load.
//!
//! Manifests are cached per resolver instance so cursor lookups can reach the
//! descending endpoints declared in them; the merge client always resolves
//! manifests first, so a lookup without a cached manifest is a misuse and
//! reported as a configuration error.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::constants::http::{PARAM_CURSOR, PARAM_UNTIL, REMOVED_SUFFIX, REQUEST_TIMEOUT};
use crate::data::{ChunkBody, Manifest};
use crate::errors::QueryError;
use crate::resolver::Resolver;
use crate::types::{CursorToken, ItemIdentity, TimelineUri};

/// Blocking HTTP resolver following the manifest endpoint descriptors.
pub struct HttpResolver {
    client: Client,
    manifests: Mutex<HashMap<TimelineUri, Manifest>>,
}

impl HttpResolver {
    /// Build a resolver with the default request timeout.
    pub fn new() -> Result<Self, QueryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                QueryError::Configuration(format!("failed building http client: {err}"))
            })?;
        Ok(Self::with_client(client))
    }

    /// Build a resolver around a preconfigured blocking client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            manifests: Mutex::new(HashMap::new()),
        }
    }

    /// GET `url` and decode a JSON body; `Ok(None)` on 404.
    fn get_json<T: DeserializeOwned>(
        &self,
        timeline: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, QueryError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|err| QueryError::TimelineUnavailable {
                timeline: timeline.to_string(),
                reason: format!("request to {url} failed: {err}"),
            })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(QueryError::TimelineUnavailable {
                timeline: timeline.to_string(),
                reason: format!("{url} returned status {}", response.status()),
            });
        }
        let body = response
            .json::<T>()
            .map_err(|err| QueryError::TimelineInconsistent {
                timeline: timeline.to_string(),
                details: format!("undecodable response from {url}: {err}"),
            })?;
        Ok(Some(body))
    }

    fn cached_manifest(&self, timeline: &str) -> Result<Manifest, QueryError> {
        let manifests = self
            .manifests
            .lock()
            .map_err(|_| QueryError::Configuration("manifest cache lock poisoned".to_string()))?;
        manifests.get(timeline).cloned().ok_or_else(|| {
            QueryError::Configuration(format!(
                "timeline '{timeline}' was not resolved before cursor lookup"
            ))
        })
    }
}

impl Resolver for HttpResolver {
    fn resolve_timelines(
        &self,
        timelines: &[TimelineUri],
    ) -> Result<IndexMap<TimelineUri, Manifest>, QueryError> {
        let mut resolved = IndexMap::new();
        for uri in timelines {
            let manifest: Manifest = self.get_json(uri, uri, &[])?.ok_or_else(|| {
                QueryError::TimelineUnavailable {
                    timeline: uri.clone(),
                    reason: "no manifest published at timeline uri".to_string(),
                }
            })?;
            if manifest.chunk_size <= 0 {
                return Err(QueryError::TimelineInconsistent {
                    timeline: uri.clone(),
                    details: format!("manifest chunk_size {} must be positive", manifest.chunk_size),
                });
            }
            debug!(timeline = %uri, chunk_size = manifest.chunk_size, "resolved manifest");
            resolved.insert(uri.clone(), manifest.clone());
            let mut manifests = self.manifests.lock().map_err(|_| {
                QueryError::Configuration("manifest cache lock poisoned".to_string())
            })?;
            manifests.insert(uri.clone(), manifest);
        }
        Ok(resolved)
    }

    fn removed_items(
        &self,
        timelines: &[TimelineUri],
    ) -> Result<HashMap<TimelineUri, HashSet<ItemIdentity>>, QueryError> {
        let mut removed = HashMap::new();
        for uri in timelines {
            let url = format!("{uri}{REMOVED_SUFFIX}");
            if let Some(identities) = self.get_json::<Vec<ItemIdentity>>(uri, &url, &[])? {
                if !identities.is_empty() {
                    removed.insert(uri.clone(), identities.into_iter().collect());
                }
            }
        }
        Ok(removed)
    }

    fn lookup_chunk_cursors(
        &self,
        timelines: &[TimelineUri],
        until: DateTime<Utc>,
    ) -> Result<IndexMap<TimelineUri, CursorToken>, QueryError> {
        let mut cursors = IndexMap::new();
        for uri in timelines {
            let manifest = self.cached_manifest(uri)?;
            let endpoint =
                manifest
                    .descending
                    .as_ref()
                    .ok_or_else(|| QueryError::TimelineInconsistent {
                        timeline: uri.clone(),
                        details: "manifest declares no descending endpoint".to_string(),
                    })?;
            let query = [(PARAM_UNTIL, until.timestamp().to_string())];
            if let Some(token) =
                self.get_json::<CursorToken>(uri, &endpoint.iterator, &query)?
            {
                cursors.insert(uri.clone(), token);
            }
        }
        Ok(cursors)
    }

    fn load_chunk_bodies(
        &self,
        cursors: &IndexMap<TimelineUri, CursorToken>,
    ) -> Result<IndexMap<TimelineUri, ChunkBody>, QueryError> {
        let mut bodies = IndexMap::new();
        for (uri, token) in cursors {
            let manifest = self.cached_manifest(uri)?;
            let endpoint =
                manifest
                    .descending
                    .as_ref()
                    .ok_or_else(|| QueryError::TimelineInconsistent {
                        timeline: uri.clone(),
                        details: "manifest declares no descending endpoint".to_string(),
                    })?;
            let query = [(PARAM_CURSOR, token.clone())];
            if let Some(chunk) = self.get_json::<ChunkBody>(uri, &endpoint.body, &query)? {
                debug!(timeline = %uri, chunk_id = chunk.chunk_id, items = chunk.items.len(), "loaded chunk body");
                bodies.insert(uri.clone(), chunk);
            }
        }
        Ok(bodies)
    }
}
