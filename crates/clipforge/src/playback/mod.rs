//! Adaptive playback: picks segmented streaming or a progressive file for a
//! surface and manages the lifetime of the streaming engine behind it.

pub mod capability;
pub mod error;
pub mod selector;
pub mod session;

pub use capability::{Capability, CapabilityDetector, SEGMENTED_MIME, StaticCapability};
pub use error::PlaybackError;
pub use selector::{AdaptivePlaybackSelector, AttachOutcome};
pub use session::{
    ActiveSource, EngineFactory, EngineOptions, PlaybackSession, PlaybackSources, PlaybackState,
    PlaybackSurface, StreamingEngine,
};
