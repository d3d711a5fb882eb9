//! Per-process driver for pixel comparisons.
//!
//! [`GoldHarness`] owns everything that outlives a single test: the scratch
//! directory, the run configuration, the comparison sessions and the
//! identity cache of the current browser. Tests call
//! [`GoldHarness::check_screenshot`] once per captured image.

use crate::artifacts::ArtifactSink;
use crate::config::GoldConfig;
use crate::dispatch::{DispatchReport, dispatch_outcome};
use crate::error::GoldError;
use crate::grace::{GracePeriod, local_today};
use crate::identity::{IdentityCache, PlatformInfo, RenderingIdentity, SystemInfo};
use crate::matching::MatchingAlgorithm;
use crate::naming::image_name_from_url;
use crate::outcome::{ComparisonOutcome, StatusCode};
use crate::png::{write_temp_png, write_temp_screenshot};
use crate::policy::should_surface;
use crate::runner::{CommandRunner, ProcessRunner};
use crate::session::{ComparisonRequest, ComparisonService as _, SessionManager};
use anyhow::Result;
use image::RgbaImage;
use jiff::civil::Date;
use log::{info, warn};
use std::path::Path;
use tempfile::{Builder, NamedTempFile, TempDir};
use tokio::time::timeout;

/// Authored metadata of one pixel test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelTest {
    /// Image name on the comparison service.
    pub name: String,
    pub grace_period: GracePeriod,
    pub matching: MatchingAlgorithm,
    /// The page runs with the GPU process disabled (software rendering).
    pub gpu_process_disabled: bool,
}

impl PixelTest {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A test named after the page it renders.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        Self::new(image_name_from_url(url))
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace_period: GracePeriod) -> Self {
        self.grace_period = grace_period;
        self
    }

    #[must_use]
    pub fn with_matching(mut self, matching: MatchingAlgorithm) -> Self {
        self.matching = matching;
        self
    }

    #[must_use]
    pub fn with_gpu_process_disabled(mut self, disabled: bool) -> Self {
        self.gpu_process_disabled = disabled;
        self
    }
}

/// Everything a single check produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub outcome: ComparisonOutcome,
    pub dispatch: DispatchReport,
    /// Whether the outcome was reported as a test failure.
    pub surfaced: bool,
}

/// Process-wide pixel comparison driver.
pub struct GoldHarness<R = ProcessRunner> {
    config: GoldConfig,
    sessions: SessionManager<R>,
    identity: IdentityCache,
    clock: Box<dyn Fn() -> Date>,
    // Declared last so sessions are gone before their directories are removed.
    scratch: TempDir,
}

impl GoldHarness<ProcessRunner> {
    /// Harness running the real `goldctl`, configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the scratch
    /// directory cannot be created.
    pub fn from_env() -> Result<Self> {
        Self::new(ProcessRunner, GoldConfig::from_env())
    }
}

impl<R: CommandRunner + Clone> GoldHarness<R> {
    /// Validates `config` and creates the process scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the scratch
    /// directory cannot be created.
    pub fn new(runner: R, config: GoldConfig) -> Result<Self> {
        let config = config.validate()?;
        let scratch = Builder::new().prefix("pixel_gold_").tempdir()?;
        info!(
            "Gold harness using {} (local: {}, try job: {})",
            scratch.path().display(),
            config.local_pixel_tests(),
            config.is_tryjob_run()
        );
        let sessions = SessionManager::new(runner, config.clone(), scratch.path().join("sessions"));
        Ok(Self {
            config,
            sessions,
            identity: IdentityCache::new(),
            clock: Box::new(local_today),
            scratch,
        })
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &GoldConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    #[inline]
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager<R> {
        &self.sessions
    }

    /// Pins the date used for grace-period decisions.
    #[inline]
    pub fn set_today(&mut self, today: Date) {
        self.set_clock(move || today);
    }

    /// Replaces the source of the current date, read once per check.
    pub fn set_clock(&mut self, clock: impl Fn() -> Date + 'static) {
        self.clock = Box::new(clock);
    }

    fn today(&self) -> Date {
        (self.clock)()
    }

    /// Forgets the cached GPU parameters; call when the browser restarts
    /// with different arguments.
    #[inline]
    pub fn reset_identity(&mut self) {
        self.identity.reset();
    }

    #[inline]
    #[must_use]
    pub const fn identity_cache(&self) -> &IdentityCache {
        &self.identity
    }

    /// Identity keys `test` would be compared under.
    ///
    /// # Errors
    ///
    /// Returns a [`GoldError`] if the GPU cannot be identified.
    pub fn gold_keys(
        &mut self,
        test: &PixelTest,
        system: &SystemInfo,
        platform: &PlatformInfo,
    ) -> Result<RenderingIdentity, GoldError> {
        let today = self.today();
        self.keys_on(test, system, platform, today)
    }

    fn keys_on(
        &mut self,
        test: &PixelTest,
        system: &SystemInfo,
        platform: &PlatformInfo,
        today: Date,
    ) -> Result<RenderingIdentity, GoldError> {
        let grace_active = test.grace_period.is_active_on(today);
        self.identity
            .identity(system, platform, test.gpu_process_disabled, grace_active)
    }

    /// Compares a captured screenshot against the approved baselines.
    ///
    /// # Errors
    ///
    /// Returns [`GoldError::ComparisonFailed`] if the comparison did not pass
    /// and the failure is not suppressed, a [`GoldError`] if the GPU cannot be
    /// identified, or an I/O error if the image cannot be written.
    pub async fn check_screenshot(
        &mut self,
        test: &PixelTest,
        screenshot: &RgbaImage,
        system: &SystemInfo,
        platform: &PlatformInfo,
        artifacts: &mut dyn ArtifactSink,
    ) -> Result<CheckReport> {
        let png_file = write_temp_screenshot(self.scratch.path(), screenshot)?;
        self.check_file(test, png_file, system, platform, artifacts)
            .await
    }

    /// Like [`GoldHarness::check_screenshot`] for an already-encoded PNG.
    ///
    /// # Errors
    ///
    /// See [`GoldHarness::check_screenshot`].
    pub async fn check_png(
        &mut self,
        test: &PixelTest,
        png: &[u8],
        system: &SystemInfo,
        platform: &PlatformInfo,
        artifacts: &mut dyn ArtifactSink,
    ) -> Result<CheckReport> {
        let png_file = write_temp_png(self.scratch.path(), png)?;
        self.check_file(test, png_file, system, platform, artifacts)
            .await
    }

    /// Runs the comparison for a written candidate. The candidate file is
    /// removed when this returns, whatever the outcome.
    async fn check_file(
        &mut self,
        test: &PixelTest,
        png_file: NamedTempFile,
        system: &SystemInfo,
        platform: &PlatformInfo,
        artifacts: &mut dyn ArtifactSink,
    ) -> Result<CheckReport> {
        let today = self.today();
        let keys = self.keys_on(test, system, platform, today)?;
        let use_luci = self.config.use_luci();
        let tryjob = self.config.is_tryjob_run();
        let limit = self.config.comparison_timeout;

        let session = self.sessions.session(&keys, None)?;
        let request = ComparisonRequest {
            name: &test.name,
            png_file: png_file.path(),
            matching: &test.matching,
            use_luci,
        };
        info!("Comparing {} against Gold baselines", test.name);
        let outcome = match limit {
            Some(limit) => timeout(limit, session.run_comparison(&request))
                .await
                .unwrap_or_else(|_| {
                    ComparisonOutcome::new(
                        StatusCode::InitFailure,
                        format!("Gold comparison timed out after {limit:?}"),
                    )
                }),
            None => session.run_comparison(&request).await,
        };

        let dispatch = dispatch_outcome(&outcome, &test.name, &*session, tryjob, artifacts);
        let surfaced = should_surface(
            &outcome,
            &test.grace_period,
            self.config.no_gold_failure,
            today,
        );
        drop(png_file);

        if surfaced {
            return Err(GoldError::ComparisonFailed.into());
        }
        if !outcome.is_pass() {
            warn!(
                "Not failing {} for Gold status {}: failure is suppressed",
                test.name, outcome.status
            );
        }
        Ok(CheckReport {
            outcome,
            dispatch,
            surfaced,
        })
    }

    /// Tears the harness down, reporting failures to remove the scratch
    /// directory instead of ignoring them.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be removed.
    pub fn close(self) -> Result<()> {
        let Self {
            sessions, scratch, ..
        } = self;
        drop(sessions);
        scratch.close()?;
        Ok(())
    }
}
