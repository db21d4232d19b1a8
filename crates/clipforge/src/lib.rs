//! Client engine for asynchronous media generation.
//!
//! - [`api`]: backend contracts ([`JobService`], [`PromptService`]) and the
//!   HTTP client implementing them.
//! - [`poller`]: job submission and per-subscription status polling.
//! - [`preview`]: thumbnail cue tracks for scrub previews and posters.
//! - [`playback`]: segmented vs progressive source selection and engine
//!   lifecycle.

pub mod api;
pub mod config;
pub mod error;
pub mod playback;
pub mod poller;
pub mod preview;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{
    ApiClient, ComposeMode, FetchedText, ImprovedPrompt, Job, JobPage, JobService, JobSpec,
    JobStatus, PromptService, PromptVariant,
};
pub use config::ClientConfig;
pub use error::ClientError;
pub use poller::{JobPoller, PollUpdate, PollerConfig, SubscriptionHandle, SubscriptionId};
pub use preview::{CueTrackLoader, poster_thumbnails};

pub use cuetrack;
