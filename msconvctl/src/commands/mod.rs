pub mod list;
pub mod play;
pub mod publish;

use clap::Args;

pub use list::{DiscoveryArgs, ListArgs, SourceChoice};
pub use play::PlayArgs;
pub use publish::PublishArgs;

/// Stops a running stream.
#[derive(Args, Debug, Clone)]
pub struct StopArgs {
    /// Stream key to stop
    #[arg(short = 's', long)]
    pub stream_key: String,
}
