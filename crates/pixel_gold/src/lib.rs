//! Visual regression checks against a Gold image comparison service.
//!
//! A captured screenshot is written to a scratch directory, keyed by the
//! rendering configuration that produced it, and submitted through `goldctl`.
//! The result is logged (with triage or local diff links where available)
//! and then gated by the run's suppression policy before it can fail a test.

pub mod artifacts;
pub mod config;
pub mod dispatch;
pub mod driver_version;
pub mod error;
pub mod grace;
pub mod harness;
pub mod identity;
pub mod logging;
pub mod matching;
pub mod naming;
pub mod outcome;
pub mod png;
pub mod policy;
pub mod runner;
pub mod session;

pub use artifacts::{ArtifactSink, RecordedArtifacts};
pub use config::GoldConfig;
pub use dispatch::{DispatchReport, dispatch_outcome};
pub use error::GoldError;
pub use grace::GracePeriod;
pub use harness::{CheckReport, GoldHarness, PixelTest};
pub use identity::{
    GpuDevice, GpuInfo, IdentityCache, ImageParameters, PlatformInfo, RenderingIdentity,
    SystemInfo,
};
pub use matching::{EdgeThreshold, FuzzyParameters, MatchingAlgorithm};
pub use outcome::{ComparisonOutcome, StatusCode};
pub use policy::should_surface;
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use session::{ComparisonRequest, ComparisonService, GoldSession, SessionManager};
