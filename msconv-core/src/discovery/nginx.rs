use reqwest::Client;
use serde::Deserialize;

use super::{fetch_text, record_stream, DiscoveryError, StreamCatalog};

/// Only streams of this application are published streams of interest.
const LIVE_APPLICATION: &str = "live";

#[derive(Debug, Default, Deserialize)]
struct RtmpStat {
    #[serde(default, rename = "server")]
    servers: Vec<ServerStat>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerStat {
    #[serde(default, rename = "application")]
    applications: Vec<ApplicationStat>,
}

#[derive(Debug, Deserialize)]
struct ApplicationStat {
    name: Option<String>,
    live: Option<LiveStat>,
}

#[derive(Debug, Default, Deserialize)]
struct LiveStat {
    #[serde(default, rename = "stream")]
    streams: Vec<StreamStat>,
}

#[derive(Debug, Deserialize)]
struct StreamStat {
    name: Option<String>,
}

/// Lists streams from the nginx-rtmp `/stat` XML page.
#[derive(Debug, Clone)]
pub struct NginxRtmpLister {
    client: Client,
    host: String,
    port: u16,
}

impl NginxRtmpLister {
    pub fn new(client: Client, host: impl Into<String>, port: u16) -> Self {
        Self {
            client,
            host: host.into(),
            port,
        }
    }

    pub fn stat_url(&self) -> String {
        format!("http://{}:{}/stat", self.host, self.port)
    }

    pub async fn list_active(&self) -> Result<StreamCatalog, DiscoveryError> {
        let url = self.stat_url();
        let body = fetch_text(&self.client, &url).await?;
        parse_stat_document(&body).map_err(|reason| DiscoveryError::Unavailable {
            endpoint: url,
            reason,
        })
    }
}

/// Builds a catalog from a `server/application/live/stream` statistics document.
pub fn parse_stat_document(xml: &str) -> Result<StreamCatalog, String> {
    let stat: RtmpStat =
        quick_xml::de::from_str(xml).map_err(|err| format!("malformed stat document: {err}"))?;
    let mut catalog = StreamCatalog::new();
    let live_streams = stat
        .servers
        .into_iter()
        .flat_map(|server| server.applications)
        .filter(|app| app.name.as_deref() == Some(LIVE_APPLICATION))
        .filter_map(|app| app.live)
        .flat_map(|live| live.streams);
    for stream in live_streams {
        if let Some(name) = stream.name.filter(|name| !name.is_empty()) {
            record_stream(&mut catalog, &name, true, None);
        }
    }
    Ok(catalog)
}
