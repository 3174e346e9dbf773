pub mod config;
pub mod discovery;
pub mod model;
pub mod supervisor;
pub mod transcode;

pub use config::{
    load_msconv_config, load_msconv_config_or_default, ConfigError, ConfigResult,
    DiscoverySection, FfmpegSection, MsconvConfig, PathsSection, PlaybackSection, PublishSection,
    SupervisorSection,
};
pub use discovery::{
    aggregate, http_client, split_stream_name, Aggregate, DiscoveryError, DiscoverySource,
    MediaMtxLister, NginxRtmpLister, StreamCatalog, StreamCatalogEntry,
};
pub use model::{default_variants, parse_variants, InputKind, InputSource, Variant, VariantError};
pub use supervisor::{
    ProcessRecord, ProcessSupervisor, StopOutcome, SupervisorError, SupervisorTimings,
    TailOutcome,
};
pub use transcode::{FfmpegBackend, PublishRequest, TranscodeBackend, TranscodeError};
