//! Track resolution onto the active provider.
//!
//! A queued track carries the metadata of the provider it was added from.
//! Before a client can play it on a different provider, a resolver maps it
//! to that provider's playable id.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::provider::ProviderError;
use crate::model::Track;

/// Maps provider-agnostic track metadata to a provider-specific playable id.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Returns the playable id for `track` on `provider`, or `None` when the
    /// provider's catalog has no match.
    async fn resolve(&self, track: &Track, provider: &str) -> Result<Option<String>, ProviderError>;
}

/// Resolves tracks that originate from the target provider to their own
/// `sourceId`. Knows nothing about other catalogs.
pub struct SourceIdResolver;

#[async_trait]
impl TrackResolver for SourceIdResolver {
    async fn resolve(&self, track: &Track, provider: &str) -> Result<Option<String>, ProviderError> {
        if track.source.as_str() == provider && !track.source_id.is_empty() {
            Ok(Some(track.source_id.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Tries each resolver in order, returning the first match.
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn TrackResolver>>,
}

impl ChainResolver {
    pub fn new(resolvers: Vec<Arc<dyn TrackResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl TrackResolver for ChainResolver {
    async fn resolve(&self, track: &Track, provider: &str) -> Result<Option<String>, ProviderError> {
        for resolver in &self.resolvers {
            if let Some(id) = resolver.resolve(track, provider).await? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

/// Memoizes successful resolutions per (provider, track identity).
///
/// Misses and errors are not cached so a later attempt can still succeed.
pub struct CachingResolver {
    inner: Arc<dyn TrackResolver>,
    cache: DashMap<(String, String), String>,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn TrackResolver>) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Stable identity of a track across queue entries: ISRC when known,
/// otherwise origin id, otherwise normalized title/artist.
fn track_identity(track: &Track) -> String {
    if let Some(isrc) = track.isrc.as_deref() {
        return format!("isrc:{}", isrc.to_ascii_uppercase());
    }
    if !track.source_id.is_empty() {
        return format!("{}:{}", track.source.as_str(), track.source_id);
    }
    format!(
        "meta:{}|{}",
        track.title.trim().to_lowercase(),
        track.artist.trim().to_lowercase()
    )
}

#[async_trait]
impl TrackResolver for CachingResolver {
    async fn resolve(&self, track: &Track, provider: &str) -> Result<Option<String>, ProviderError> {
        let key = (provider.to_string(), track_identity(track));
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Some(hit.value().clone()));
        }

        let resolved = self.inner.resolve(track, provider).await?;
        if let Some(id) = &resolved {
            log::debug!("[Client] Resolved {:?} on {} -> {}", track.title, provider, id);
            self.cache.insert(key, id.clone());
        }
        Ok(resolved)
    }
}
