//! Trellis turns an uploaded document into a structured, hierarchical task
//! list (a breakdown tree) through a multi-stage, AI-assisted pipeline:
//! segment the document, understand its global structure, extract candidate
//! nodes per region, validate and consolidate them into a draft hierarchy,
//! verify the draft, escalate unresolved regions to a judged multi-candidate
//! re-extraction, and persist and summarize the result. Clients follow
//! progress through a live status feed and can answer one human-in-the-loop
//! question mid-run.

pub mod docint;
pub mod error;
pub mod hitl;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod settings;
pub mod status;
pub mod storage;
pub mod workflow;

pub use error::PipelineError;
pub use settings::Settings;
pub use workflow::{Orchestrator, UploadRequest};

use tracing_subscriber::EnvFilter;

/// Initialize tracing with an env-filter, defaulting to `info` for this
/// crate. Call once at process start; embedding applications that bring
/// their own subscriber should skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trellis=info")),
        )
        .init();
}
