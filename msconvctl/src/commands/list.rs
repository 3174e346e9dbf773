use clap::{Args, ValueEnum};
use msconv_core::{
    http_client, DiscoveryError, DiscoverySection, DiscoverySource, MediaMtxLister,
    NginxRtmpLister,
};

/// Which statistics endpoints to query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SourceChoice {
    #[default]
    Nginx,
    Mediamtx,
    All,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DiscoveryArgs {
    /// Source to list streams from
    #[arg(long, value_enum, default_value_t = SourceChoice::Nginx)]
    pub source: SourceChoice,
    /// nginx-rtmp host
    #[arg(long)]
    pub nginx_host: Option<String>,
    /// nginx-rtmp stat port
    #[arg(long)]
    pub nginx_stat_port: Option<u16>,
    /// MediaMTX host
    #[arg(long)]
    pub media_host: Option<String>,
    /// MediaMTX API port
    #[arg(long)]
    pub media_api_port: Option<u16>,
}

impl DiscoveryArgs {
    /// Builds the selected sources, flags overriding the `[discovery]` section.
    pub fn sources(&self, config: &DiscoverySection) -> Result<Vec<DiscoverySource>, DiscoveryError> {
        let client = http_client(config.timeout())?;
        let mut sources = Vec::new();
        if matches!(self.source, SourceChoice::Nginx | SourceChoice::All) {
            sources.push(DiscoverySource::Nginx(NginxRtmpLister::new(
                client.clone(),
                self.nginx_host.clone().unwrap_or_else(|| config.nginx_host.clone()),
                self.nginx_stat_port.unwrap_or(config.nginx_stat_port),
            )));
        }
        if matches!(self.source, SourceChoice::Mediamtx | SourceChoice::All) {
            sources.push(DiscoverySource::MediaMtx(MediaMtxLister::new(
                client,
                self.media_host.clone().unwrap_or_else(|| config.mediamtx_host.clone()),
                self.media_api_port.unwrap_or(config.mediamtx_api_port),
            )));
        }
        Ok(sources)
    }
}

/// Lists active streams.
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}
