//! Detection engine: media loading, decoding, container walkers, signal
//! processing helpers, the analyzers and their orchestration

pub mod analysis;
pub mod buffer;
pub mod cancel;
pub mod container;
pub mod decoder;
pub mod dsp;
pub mod media;
pub mod orchestrator;

pub use buffer::{ChannelPlane, PcmBuffer, PixelPlanes, SampleBuffer};
pub use cancel::CancelToken;
pub use decoder::{CodecDecoder, MediaDecoder};
pub use media::{ContainerFormat, MediaFile, MediaKind};
pub use orchestrator::{BatchOutcome, Orchestrator, OrchestratorBuilder};
