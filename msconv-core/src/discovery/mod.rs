mod mediamtx;
mod nginx;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub use self::mediamtx::{parse_paths_list, MediaMtxLister};
pub use self::nginx::{parse_stat_document, NginxRtmpLister};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery source {endpoint} unavailable: {reason}")]
    Unavailable { endpoint: String, reason: String },
}

/// All variants of one logical stream as seen by the discovery sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamCatalogEntry {
    pub base_key: String,
    pub variants: BTreeSet<String>,
    pub live: bool,
    pub readers: BTreeMap<String, u64>,
}

impl StreamCatalogEntry {
    pub fn new(base_key: impl Into<String>) -> Self {
        Self {
            base_key: base_key.into(),
            ..Self::default()
        }
    }

    fn absorb(&mut self, other: StreamCatalogEntry) {
        self.variants.extend(other.variants);
        self.live |= other.live;
        for (variant, count) in other.readers {
            *self.readers.entry(variant).or_default() += count;
        }
    }
}

pub type StreamCatalog = BTreeMap<String, StreamCatalogEntry>;

/// Splits `"<base>_<variant>"` on the last underscore.
pub fn split_stream_name(name: &str) -> (String, String) {
    match name.rsplit_once('_') {
        Some((base, variant)) => (base.to_string(), variant.to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// Folds one published name into the catalog. Live status only ever turns on.
pub fn record_stream(catalog: &mut StreamCatalog, name: &str, live: bool, readers: Option<u64>) {
    let (base_key, variant) = split_stream_name(name);
    let entry = catalog
        .entry(base_key.clone())
        .or_insert_with(|| StreamCatalogEntry::new(base_key));
    entry.live |= live;
    if let Some(count) = readers {
        *entry.readers.entry(variant.clone()).or_default() += count;
    }
    if !variant.is_empty() {
        entry.variants.insert(variant);
    }
}

pub fn merge_catalogs(into: &mut StreamCatalog, from: StreamCatalog) {
    for (base_key, entry) in from {
        match into.get_mut(&base_key) {
            Some(existing) => existing.absorb(entry),
            None => {
                into.insert(base_key, entry);
            }
        }
    }
}

pub fn http_client(timeout: Duration) -> Result<Client, DiscoveryError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| DiscoveryError::Unavailable {
            endpoint: "http client".to_string(),
            reason: err.to_string(),
        })
}

async fn fetch_text(client: &Client, url: &str) -> Result<String, DiscoveryError> {
    let unavailable = |reason: String| DiscoveryError::Unavailable {
        endpoint: url.to_string(),
        reason,
    };
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| unavailable(err.to_string()))?
        .error_for_status()
        .map_err(|err| unavailable(err.to_string()))?;
    response.text().await.map_err(|err| unavailable(err.to_string()))
}

/// The statistics endpoints msconv can enumerate streams from.
#[derive(Debug, Clone)]
pub enum DiscoverySource {
    Nginx(NginxRtmpLister),
    MediaMtx(MediaMtxLister),
}

impl DiscoverySource {
    pub fn name(&self) -> &'static str {
        match self {
            DiscoverySource::Nginx(_) => "nginx",
            DiscoverySource::MediaMtx(_) => "mediamtx",
        }
    }

    pub async fn list_active(&self) -> Result<StreamCatalog, DiscoveryError> {
        match self {
            DiscoverySource::Nginx(lister) => lister.list_active().await,
            DiscoverySource::MediaMtx(lister) => lister.list_active().await,
        }
    }
}

#[derive(Debug, Default)]
pub struct Aggregate {
    pub catalog: StreamCatalog,
    pub failures: Vec<DiscoveryError>,
}

/// Queries every source and merges what answered; failures are collected, not raised.
pub async fn aggregate(sources: &[DiscoverySource]) -> Aggregate {
    let mut result = Aggregate::default();
    for source in sources {
        match source.list_active().await {
            Ok(catalog) => {
                debug!(
                    source = source.name(),
                    streams = catalog.len(),
                    "discovery source answered"
                );
                merge_catalogs(&mut result.catalog, catalog);
            }
            Err(error) => {
                warn!(source = source.name(), %error, "discovery source failed");
                result.failures.push(error);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_on_last_separator() {
        let pair = |base: &str, variant: &str| (base.to_string(), variant.to_string());
        assert_eq!(split_stream_name("mystream_720p"), pair("mystream", "720p"));
        assert_eq!(split_stream_name("mystream"), pair("mystream", ""));
        assert_eq!(split_stream_name("a_b_c"), pair("a_b", "c"));
        assert_eq!(split_stream_name("trailing_"), pair("trailing", ""));
    }

    #[test]
    fn live_status_is_sticky() {
        let mut catalog = StreamCatalog::new();
        record_stream(&mut catalog, "cam_720p", true, None);
        record_stream(&mut catalog, "cam_480p", false, None);
        let entry = &catalog["cam"];
        assert!(entry.live);
        assert_eq!(entry.variants.iter().collect::<Vec<_>>(), ["480p", "720p"]);
    }

    #[test]
    fn merge_unions_variants_and_sums_readers() {
        let mut left = StreamCatalog::new();
        record_stream(&mut left, "cam_720p", false, Some(2));
        let mut right = StreamCatalog::new();
        record_stream(&mut right, "cam_720p", true, Some(1));
        record_stream(&mut right, "cam_360p", true, Some(0));
        record_stream(&mut right, "other", true, None);

        merge_catalogs(&mut left, right);
        assert_eq!(left.len(), 2);
        let cam = &left["cam"];
        assert!(cam.live);
        assert_eq!(cam.variants.len(), 2);
        assert_eq!(cam.readers["720p"], 3);
        assert!(left["other"].variants.is_empty());
    }
}
