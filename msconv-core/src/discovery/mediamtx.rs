use reqwest::Client;
use serde::Deserialize;

use super::{fetch_text, record_stream, DiscoveryError, StreamCatalog};

#[derive(Debug, Deserialize)]
struct PathList {
    #[serde(default)]
    items: Vec<PathItem>,
}

#[derive(Debug, Deserialize)]
struct PathItem {
    name: String,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    readers: Vec<serde_json::Value>,
}

/// Lists paths from the MediaMTX control API (`/v3/paths/list`).
///
/// Paths that are configured but not receiving a publisher show up as not live.
#[derive(Debug, Clone)]
pub struct MediaMtxLister {
    client: Client,
    host: String,
    port: u16,
}

impl MediaMtxLister {
    pub fn new(client: Client, host: impl Into<String>, port: u16) -> Self {
        Self {
            client,
            host: host.into(),
            port,
        }
    }

    pub fn paths_url(&self) -> String {
        format!("http://{}:{}/v3/paths/list", self.host, self.port)
    }

    pub async fn list_active(&self) -> Result<StreamCatalog, DiscoveryError> {
        let url = self.paths_url();
        let body = fetch_text(&self.client, &url).await?;
        parse_paths_list(&body).map_err(|reason| DiscoveryError::Unavailable {
            endpoint: url,
            reason,
        })
    }
}

pub fn parse_paths_list(json: &str) -> Result<StreamCatalog, String> {
    let list: PathList =
        serde_json::from_str(json).map_err(|err| format!("malformed path list: {err}"))?;
    let mut catalog = StreamCatalog::new();
    for item in list.items {
        let readers = item.readers.len() as u64;
        record_stream(&mut catalog, &item.name, item.ready, Some(readers));
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_paths_are_live_and_readers_are_counted() {
        let json = r#"{
            "itemCount": 3,
            "pageCount": 1,
            "items": [
                {"name": "cam_720p", "ready": true, "readers": [{"type": "rtspSession", "id": "a"}, {"type": "rtspSession", "id": "b"}]},
                {"name": "cam_360p", "ready": true, "readers": []},
                {"name": "idle", "ready": false, "readers": []}
            ]
        }"#;
        let catalog = parse_paths_list(json).unwrap();
        let cam = &catalog["cam"];
        assert!(cam.live);
        assert_eq!(cam.readers["720p"], 2);
        assert_eq!(cam.readers["360p"], 0);
        assert!(!catalog["idle"].live);
    }

    #[test]
    fn empty_listing() {
        assert!(parse_paths_list(r#"{"itemCount":0,"pageCount":0,"items":[]}"#)
            .unwrap()
            .is_empty());
        assert!(parse_paths_list("{}").unwrap().is_empty());
        assert!(parse_paths_list("<html>").is_err());
    }
}
