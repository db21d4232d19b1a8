//! Backend contracts and their HTTP implementation.

pub mod client;
pub mod models;
pub mod service;

pub use client::ApiClient;
pub use models::{ComposeMode, ImprovedPrompt, Job, JobPage, JobSpec, JobStatus, PromptVariant};
pub use service::{FetchedText, JobService, PromptService};
