//! Run configuration for Gold comparisons.
//!
//! Configuration can be loaded from environment variables or constructed
//! programmatically. [`GoldConfig::validate`] must be called before the
//! configuration is used for a run.

use crate::error::GoldError;
use core::time::Duration;
use log::{info, warn};
use std::env;
use std::path::PathBuf;
use std::process::Command;

/// Gold instance and corpus used for GPU pixel tests.
pub const DEFAULT_INSTANCE: &str = "chrome-gpu";
pub const DEFAULT_CORPUS: &str = "chrome-gpu";
pub const DEFAULT_CODE_REVIEW_SYSTEM: &str = "gerrit";
pub const DEFAULT_CONTINUOUS_INTEGRATION_SYSTEM: &str = "buildbucket";

/// Environment variable that is only present on bots.
const BOT_MARKER_VAR: &str = "SWARMING_SERVER";

/// Runtime configuration for a pixel test run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoldConfig {
    /// Revision being tested.
    pub git_revision: Option<String>,
    /// Code review issue; its presence makes this a try-job run.
    pub issue: Option<String>,
    pub patchset: Option<String>,
    /// Build id of the try job.
    pub job_id: Option<String>,
    pub code_review_system: String,
    pub continuous_integration_system: String,
    pub instance: String,
    pub corpus: String,
    pub bucket: Option<String>,
    pub goldctl_path: PathBuf,
    /// `None` until resolved; see [`GoldConfig::local_pixel_tests`].
    pub local_pixel_tests: Option<bool>,
    /// Rely on a pre-authenticated context instead of ambient credentials.
    pub no_luci_auth: bool,
    /// Skip all interaction with Gold; every comparison passes.
    pub bypass_gold_functionality: bool,
    /// Run comparisons as usual but never fail a test because of them.
    pub no_gold_failure: bool,
    /// Caller-level limit on one comparison.
    pub comparison_timeout: Option<Duration>,
}

impl Default for GoldConfig {
    fn default() -> Self {
        Self {
            git_revision: None,
            issue: None,
            patchset: None,
            job_id: None,
            code_review_system: DEFAULT_CODE_REVIEW_SYSTEM.to_owned(),
            continuous_integration_system: DEFAULT_CONTINUOUS_INTEGRATION_SYSTEM.to_owned(),
            instance: DEFAULT_INSTANCE.to_owned(),
            corpus: DEFAULT_CORPUS.to_owned(),
            bucket: None,
            goldctl_path: PathBuf::from("goldctl"),
            local_pixel_tests: None,
            no_luci_auth: false,
            bypass_gold_functionality: false,
            no_gold_failure: false,
            comparison_timeout: None,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.is_empty())
}

fn env_flag(name: &str) -> bool {
    env::var(name).ok().as_deref() == Some("1")
}

impl GoldConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `GOLD_GIT_REVISION`, `GOLD_GERRIT_ISSUE`, `GOLD_GERRIT_PATCHSET`,
    ///   `GOLD_BUILDBUCKET_ID`
    /// - `GOLD_CODE_REVIEW_SYSTEM` (default: `gerrit`)
    /// - `GOLD_CONTINUOUS_INTEGRATION_SYSTEM` (default: `buildbucket`)
    /// - `GOLD_INSTANCE`, `GOLD_CORPUS` (default: `chrome-gpu`)
    /// - `GOLD_BUCKET`, `GOLDCTL_PATH` (default: `goldctl`)
    /// - `GOLD_LOCAL_PIXEL_TESTS`: `1` or `0`; unset means auto-detect
    /// - `GOLD_NO_LUCI_AUTH`, `GOLD_BYPASS_FUNCTIONALITY`, `GOLD_NO_FAILURE`:
    ///   set to `1` to enable
    /// - `GOLD_COMPARISON_TIMEOUT_SECS`: per-comparison timeout in seconds
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            git_revision: env_string("GOLD_GIT_REVISION"),
            issue: env_string("GOLD_GERRIT_ISSUE"),
            patchset: env_string("GOLD_GERRIT_PATCHSET"),
            job_id: env_string("GOLD_BUILDBUCKET_ID"),
            code_review_system: env_string("GOLD_CODE_REVIEW_SYSTEM")
                .unwrap_or(defaults.code_review_system),
            continuous_integration_system: env_string("GOLD_CONTINUOUS_INTEGRATION_SYSTEM")
                .unwrap_or(defaults.continuous_integration_system),
            instance: env_string("GOLD_INSTANCE").unwrap_or(defaults.instance),
            corpus: env_string("GOLD_CORPUS").unwrap_or(defaults.corpus),
            bucket: env_string("GOLD_BUCKET"),
            goldctl_path: env_string("GOLDCTL_PATH").map_or(defaults.goldctl_path, PathBuf::from),
            local_pixel_tests: env_string("GOLD_LOCAL_PIXEL_TESTS").map(|val| val == "1"),
            no_luci_auth: env_flag("GOLD_NO_LUCI_AUTH"),
            bypass_gold_functionality: env_flag("GOLD_BYPASS_FUNCTIONALITY"),
            no_gold_failure: env_flag("GOLD_NO_FAILURE"),
            comparison_timeout: env_string("GOLD_COMPARISON_TIMEOUT_SECS")
                .and_then(|val| val.parse::<u64>().ok())
                .and_then(|secs| (secs > 0).then_some(Duration::from_secs(secs))),
        }
    }

    /// Whether this run is in local mode.
    ///
    /// Local mode never uploads and produces local diff images instead of
    /// triage links. If not set explicitly, a run is local unless it is on a
    /// bot.
    #[must_use]
    pub fn local_pixel_tests(&self) -> bool {
        self.local_pixel_tests
            .unwrap_or_else(|| env::var_os(BOT_MARKER_VAR).is_none())
    }

    /// Whether this is a try-job (pre-submit) run.
    #[inline]
    #[must_use]
    pub const fn is_tryjob_run(&self) -> bool {
        self.issue.is_some()
    }

    /// Whether short-lived ambient credentials should be used.
    #[must_use]
    pub fn use_luci(&self) -> bool {
        !(self.local_pixel_tests() || self.no_luci_auth)
    }

    /// Resolves local mode and the revision, and checks consistency.
    ///
    /// A local run without a revision falls back to the checkout's `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns [`GoldError::InvalidConfig`] if a bot run has no revision or a
    /// try-job run lacks its patchset or job id.
    pub fn validate(mut self) -> Result<Self, GoldError> {
        let local = self.local_pixel_tests();
        self.local_pixel_tests = Some(local);

        if self.git_revision.is_none() {
            if !local {
                return Err(GoldError::InvalidConfig(
                    "a git revision is required when running on a bot".to_owned(),
                ));
            }
            self.git_revision = local_head_revision();
            if let Some(revision) = &self.git_revision {
                info!("Using local checkout revision {revision}");
            }
        }

        if self.is_tryjob_run() && (self.patchset.is_none() || self.job_id.is_none()) {
            return Err(GoldError::InvalidConfig(
                "try-job runs require both a patchset and a job id".to_owned(),
            ));
        }
        Ok(self)
    }
}

/// Best-effort `git rev-parse HEAD` in the current directory.
fn local_head_revision() -> Option<String> {
    let output = match Command::new("git").args(["rev-parse", "HEAD"]).output() {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            warn!(
                "Could not determine local revision: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        Err(err) => {
            warn!("Could not run git to determine local revision: {err}");
            return None;
        }
    };
    let revision = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    (!revision.is_empty()).then_some(revision)
}
