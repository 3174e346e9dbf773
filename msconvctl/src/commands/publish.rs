use std::fs;
use std::path::PathBuf;

use clap::Args;
use msconv_core::{InputKind, InputSource};

use crate::{AppError, Result};

/// Publishes a new stream.
#[derive(Args, Debug, Clone, Default)]
pub struct PublishArgs {
    /// Base stream key
    #[arg(short = 's', long)]
    pub stream_key: String,
    /// Path to a local video file
    #[arg(short = 'i', long)]
    pub input_file: Option<PathBuf>,
    /// Video device (e.g. /dev/video0 or 0)
    #[arg(short = 'd', long)]
    pub device: Option<String>,
    /// RTMP source URL
    #[arg(short = 'r', long)]
    pub input_rtmp: Option<String>,
    /// RTSP source URL
    #[arg(long)]
    pub input_rtsp: Option<String>,
    /// UDP source (e.g. 127.0.0.1:1234)
    #[arg(long)]
    pub input_udp: Option<String>,
    /// HTTP/HTTPS source URL
    #[arg(long)]
    pub input_http: Option<String>,
    /// Any source; the kind is inferred from the URL scheme
    #[arg(long)]
    pub input_url: Option<String>,
    /// Publish the original without variants
    #[arg(short = 'o', long)]
    pub original: bool,
    /// Custom variants (label:bitrate:width:height,...)
    #[arg(short = 'v', long)]
    pub variants: Option<String>,
    /// Disable audio encoding
    #[arg(long)]
    pub no_audio: bool,
    /// Don't loop the input file
    #[arg(long)]
    pub no_loop: bool,
    /// RTMP output base URL (defaults to publish.output_url)
    #[arg(long, alias = "nginx-rtmp-url")]
    pub output_url: Option<String>,
}

impl PublishArgs {
    /// Builds the single input source the operator selected.
    pub fn input_source(&self) -> Result<InputSource> {
        let selected = [
            self.input_file.is_some(),
            self.device.is_some(),
            self.input_rtmp.is_some(),
            self.input_rtsp.is_some(),
            self.input_udp.is_some(),
            self.input_http.is_some(),
            self.input_url.is_some(),
        ]
        .iter()
        .filter(|chosen| **chosen)
        .count();
        if selected != 1 {
            return Err(AppError::InputSelection);
        }

        let loop_file = !self.no_loop;
        let source = if let Some(path) = &self.input_file {
            let absolute = fs::canonicalize(path)?;
            InputSource::file(absolute.to_string_lossy(), loop_file)
        } else if let Some(device) = &self.device {
            InputSource::new(InputKind::Device, device)
        } else if let Some(url) = &self.input_rtmp {
            InputSource::new(InputKind::Rtmp, url)
        } else if let Some(url) = &self.input_rtsp {
            InputSource::new(InputKind::Rtsp, url)
        } else if let Some(addr) = &self.input_udp {
            InputSource::new(InputKind::Udp, addr)
        } else if let Some(url) = &self.input_http {
            InputSource::new(InputKind::Http, url)
        } else if let Some(url) = &self.input_url {
            let mut source = InputSource::from_url(url)?;
            if source.kind == InputKind::File {
                source.loop_file = loop_file;
            }
            source
        } else {
            return Err(AppError::InputSelection);
        };
        Ok(source)
    }
}
