//! The extraction and quality-control engine.
//!
//! Stage order: analyze, extract, validate, consolidate, verify, escalate,
//! summarize. Validation and consolidation are pure functions; everything
//! else is one AI pass with a lenient parser.

pub mod analyze;
pub mod consolidate;
pub mod escalate;
pub mod extract;
pub mod prompts;
pub mod summarize;
pub mod validate;
pub mod verify;

pub use analyze::{analyze_document, AnalysisOutcome};
pub use consolidate::consolidate;
pub use escalate::{escalate_and_judge, merge_patches, Candidate, CandidateSpec, JudgeDecision};
pub use extract::{extract_region, ExtractionOutcome, RegionExtraction};
pub use summarize::{generate_summary, RunSummary};
pub use validate::validate_nodes;
pub use verify::{verify_document, EscalationPlan, VerifierIssue, VerifyOutcome, VerifyOutput};
