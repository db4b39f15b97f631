pub mod archive;
pub mod assets;
pub mod catalog;
pub mod common;
pub mod config;
pub mod errors;
pub mod gcode;
pub mod metadata;
pub mod pipeline;
pub mod plan;
pub mod plan_execution;
pub mod playlist;
pub mod publish;

pub use archive::ArchiveWorkspace;
pub use catalog::{inspect_archive, PlateSummary};
pub use config::EngineConfig;
pub use errors::{SwapError, SwapResult};
pub use pipeline::{PipelineReport, RecombinationPipeline, Stage};
pub use playlist::{ExpandedGcodeEntry, PlaylistEntry};
pub use publish::Publisher;
