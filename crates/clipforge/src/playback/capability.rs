// Playback capability detection, resolved once per session.

/// MIME type of a segmented-streaming manifest.
pub const SEGMENTED_MIME: &str = "application/vnd.apple.mpegurl";

/// What the runtime can do with a segmented manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// A streaming engine can be constructed.
    EngineAvailable,
    /// No engine, but the surface may understand manifests on its own.
    NativeOnly,
    /// Neither; only progressive files can play.
    Unsupported,
}

impl Capability {
    pub fn engine_available(self) -> bool {
        self == Self::EngineAvailable
    }
}

/// Probes the environment for playback support.
pub trait CapabilityDetector: Send + Sync {
    fn detect(&self) -> Capability;
}

/// A detector with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticCapability(pub Capability);

impl CapabilityDetector for StaticCapability {
    fn detect(&self) -> Capability {
        self.0
    }
}

impl<F> CapabilityDetector for F
where
    F: Fn() -> Capability + Send + Sync,
{
    fn detect(&self) -> Capability {
        self()
    }
}
