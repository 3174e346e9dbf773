use clap::Args;

use super::list::DiscoveryArgs;
use crate::player::Player;

/// Plays a stream; with `-l` the stream is picked from the active list.
#[derive(Args, Debug, Clone, Default)]
pub struct PlayArgs {
    /// Stream key to play (omit when using -l)
    #[arg(short = 's', long)]
    pub stream_key: Option<String>,
    /// Interactively list and choose a live stream
    #[arg(short = 'l')]
    pub do_list: bool,
    /// Play the original stream
    #[arg(short = 'o', long)]
    pub original: bool,
    /// Variant to play
    #[arg(short = 'v', long, default_value = "")]
    pub variant: String,
    /// RTSP host serving the streams (defaults to playback.host)
    #[arg(long)]
    pub media_host_rtsp: Option<String>,
    /// RTSP port (defaults to playback.rtsp_port)
    #[arg(long)]
    pub media_rtsp_port: Option<u16>,
    /// Player to use (defaults to playback.player)
    #[arg(long, value_enum)]
    pub player: Option<Player>,
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}
