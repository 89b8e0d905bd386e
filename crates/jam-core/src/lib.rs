//! Core engine for the VibeCode Jam interview platform.
//!
//! Two subsystems run on every candidate submission and are provided here:
//!
//! - **Sandboxed execution**: untrusted candidate code is compiled and run in
//!   throwaway containers with memory, CPU and wall-clock limits. A native
//!   container-engine client is preferred, with a command-line fallback, and the
//!   feature degrades to a structured "disabled" result when neither is usable.
//! - **Anti-cheat aggregation**: behavioral telemetry (tab switches, pastes,
//!   typing cadence, network probes) is classified, stored per session and folded
//!   into a trust score with warnings.
//!
//! Grading and AI-authorship detection are delegated to an external assessment
//! oracle reached through the [`assessment::AssessmentOracle`] trait.

pub mod anti_cheat;
pub mod assessment;
pub mod config;
pub mod errors;
pub mod executors;

pub use anti_cheat::{EventType, MetricsAggregator, SessionStore, Severity};
pub use assessment::{AssessmentOracle, SubmissionEvaluator};
pub use config::{ConfigLoader, JamConfig};
pub use errors::{JamError, SandboxBackendError};
pub use executors::{
    BackendSelection, BackendStrategy, ExecutionRequest, ExecutionResult, Language,
    SandboxRunner,
};
