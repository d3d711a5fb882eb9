//! Comparison sessions against a Gold instance.
//!
//! A session is bound to one rendering identity and corpus. It authenticates
//! and initializes `goldctl` once, then compares any number of images,
//! remembering per image which triage or local diff links were produced.

use crate::config::GoldConfig;
use crate::identity::RenderingIdentity;
use crate::matching::MatchingAlgorithm;
use crate::outcome::{ComparisonOutcome, StatusCode};
use crate::runner::{CommandOutput, CommandRunner};
use anyhow::{Context as _, Result, anyhow};
use log::{error, info, warn};
use serde_json::to_vec_pretty;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{create_dir_all, read_dir, read_to_string, remove_file, write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use url::Url;

const KEYS_FILE: &str = "keys.json";
const TRIAGE_LINK_FILE: &str = "triage_link.txt";
const DIFF_DIR: &str = "diffs";

/// One image comparison.
#[derive(Debug, Clone, Copy)]
pub struct ComparisonRequest<'req> {
    /// Test (image) name on the service.
    pub name: &'req str,
    /// Candidate image, already written as PNG.
    pub png_file: &'req Path,
    pub matching: &'req MatchingAlgorithm,
    /// Use short-lived ambient credentials rather than a pre-authenticated
    /// context.
    pub use_luci: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageLinks {
    pub public: Option<String>,
    pub internal: Option<String>,
}

/// `file://` links to images produced by a local diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalDiffLinks {
    /// The candidate image.
    pub given: Option<String>,
    /// The closest approved baseline.
    pub closest: Option<String>,
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct ComparisonResults {
    triage: TriageLinks,
    omission_reason: Option<String>,
    local_diff: LocalDiffLinks,
}

/// A remote comparison service as seen by the harness.
pub trait ComparisonService {
    /// Compares one image; failures are reported in the outcome, never raised.
    async fn run_comparison(&mut self, request: &ComparisonRequest<'_>) -> ComparisonOutcome;

    /// Triage links recorded for `name` by its last comparison.
    fn triage_links(&self, name: &str) -> TriageLinks;

    /// Why no triage link is available for `name`.
    fn triage_link_omission_reason(&self, name: &str) -> String;

    /// Local diff links recorded for `name` by its last comparison.
    fn local_diff_links(&self, name: &str) -> LocalDiffLinks;
}

/// Public mirror of a Gold instance, used for diffs and public links.
fn public_instance(instance: &str) -> String {
    if instance == "chrome" {
        "chrome-public".to_owned()
    } else {
        instance.to_owned()
    }
}

fn cl_triage_link(instance: &str, config: &GoldConfig) -> String {
    format!(
        "https://{instance}-gold.skia.org/cl/{}/{}",
        config.code_review_system,
        config.issue.as_deref().unwrap_or_default()
    )
}

/// `goldctl`-backed comparison session.
pub struct GoldSession<R> {
    runner: R,
    config: GoldConfig,
    corpus: String,
    working_dir: PathBuf,
    keys_file: PathBuf,
    triage_link_file: PathBuf,
    authenticated: bool,
    initialized: bool,
    results: HashMap<String, ComparisonResults>,
    /// Output directories of local diffs, removed with the session.
    diff_dirs: Vec<TempDir>,
}

impl<R: CommandRunner> GoldSession<R> {
    /// Creates a session and writes its keys file into `working_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory or keys file cannot be
    /// written.
    pub fn new(
        runner: R,
        config: GoldConfig,
        working_dir: PathBuf,
        identity: &RenderingIdentity,
        corpus: &str,
    ) -> Result<Self> {
        create_dir_all(&working_dir)
            .with_context(|| format!("creating {}", working_dir.display()))?;
        let keys_file = working_dir.join(KEYS_FILE);
        write(&keys_file, to_vec_pretty(identity)?)
            .with_context(|| format!("writing {}", keys_file.display()))?;
        let triage_link_file = working_dir.join(TRIAGE_LINK_FILE);
        Ok(Self {
            runner,
            config,
            corpus: corpus.to_owned(),
            working_dir,
            keys_file,
            triage_link_file,
            authenticated: false,
            initialized: false,
            results: HashMap::new(),
            diff_dirs: Vec::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[inline]
    #[must_use]
    pub fn keys_file(&self) -> &Path {
        &self.keys_file
    }

    fn work_dir_arg(&self) -> String {
        self.working_dir.display().to_string()
    }

    async fn run_goldctl(&self, args: Vec<String>) -> Result<CommandOutput> {
        self.runner.run(&self.config.goldctl_path, &args).await
    }

    /// Authenticates with Gold, once per session.
    ///
    /// # Errors
    ///
    /// Returns an error if `goldctl` cannot be run.
    pub async fn authenticate(&mut self, use_luci: bool) -> Result<CommandOutput> {
        if self.config.bypass_gold_functionality {
            warn!("Not authenticating with Gold: Gold functionality is bypassed");
            return Ok(CommandOutput::default());
        }
        if self.authenticated {
            return Ok(CommandOutput::default());
        }
        let mut args = vec!["auth".to_owned(), "--work-dir".to_owned(), self.work_dir_arg()];
        if use_luci {
            args.push("--luci".to_owned());
        } else if !self.config.local_pixel_tests() {
            warn!("Authenticating without ambient credentials outside local mode");
        }
        let output = self.run_goldctl(args).await?;
        self.authenticated = output.success();
        Ok(output)
    }

    /// Initializes the image test run, once per session.
    ///
    /// # Errors
    ///
    /// Returns an error if `goldctl` cannot be run.
    pub async fn initialize(&mut self) -> Result<CommandOutput> {
        if self.config.bypass_gold_functionality {
            warn!("Not initializing Gold: Gold functionality is bypassed");
            return Ok(CommandOutput::default());
        }
        if self.initialized {
            return Ok(CommandOutput::default());
        }
        let mut args = vec![
            "imgtest".to_owned(),
            "init".to_owned(),
            "--passfail".to_owned(),
            "--instance".to_owned(),
            self.config.instance.clone(),
            "--corpus".to_owned(),
            self.corpus.clone(),
            "--keys-file".to_owned(),
            self.keys_file.display().to_string(),
        ];
        args.extend(["--work-dir".to_owned(), self.work_dir_arg()]);
        args.extend([
            "--failure-file".to_owned(),
            self.triage_link_file.display().to_string(),
        ]);
        args.extend([
            "--commit".to_owned(),
            self.config.git_revision.clone().unwrap_or_default(),
        ]);
        if let Some(bucket) = &self.config.bucket {
            args.extend(["--bucket".to_owned(), bucket.clone()]);
        }
        if self.config.is_tryjob_run() {
            let pairs = [
                ("--issue", self.config.issue.clone()),
                ("--patchset", self.config.patchset.clone()),
                ("--jobid", self.config.job_id.clone()),
                ("--crs", Some(self.config.code_review_system.clone())),
                ("--cis", Some(self.config.continuous_integration_system.clone())),
            ];
            for (flag, value) in pairs {
                args.extend([flag.to_owned(), value.unwrap_or_default()]);
            }
        }
        let output = self.run_goldctl(args).await?;
        self.initialized = output.success();
        Ok(output)
    }

    /// Compares `png_file` against the baselines for `name`.
    ///
    /// Records the triage link, or the reason there is none, for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if `goldctl` cannot be run.
    pub async fn compare(
        &mut self,
        name: &str,
        png_file: &Path,
        matching: &MatchingAlgorithm,
    ) -> Result<CommandOutput> {
        if self.config.bypass_gold_functionality {
            warn!("Not comparing {name} with Gold: Gold functionality is bypassed");
            return Ok(CommandOutput::default());
        }
        let mut args = vec![
            "imgtest".to_owned(),
            "add".to_owned(),
            "--test-name".to_owned(),
            name.to_owned(),
            "--png-file".to_owned(),
            png_file.display().to_string(),
            "--work-dir".to_owned(),
            self.work_dir_arg(),
        ];
        if self.config.local_pixel_tests() {
            args.push("--dryrun".to_owned());
        }
        let matching_args = matching.command_line();
        if !matching_args.is_empty() {
            info!("Using {matching} matching for image {name}");
            args.extend(matching_args);
        }

        // goldctl only writes the file on failure; stale links must not leak
        // into this comparison.
        let _ignore_result = remove_file(&self.triage_link_file);
        let output = self.run_goldctl(args).await?;

        let mut results = ComparisonResults::default();
        if output.success() {
            results.omission_reason = Some("Comparison succeeded, no triage link".to_owned());
        } else if self.config.is_tryjob_run() {
            results.triage.internal = Some(cl_triage_link(&self.config.instance, &self.config));
            results.triage.public = Some(cl_triage_link(
                &public_instance(&self.config.instance),
                &self.config,
            ));
        } else {
            match read_to_string(&self.triage_link_file) {
                Ok(contents) if contents.trim().is_empty() => {
                    results.omission_reason = Some(
                        "Gold did not provide a triage link. This is likely a bug on Gold's end."
                            .to_owned(),
                    );
                }
                Ok(contents) => {
                    let link = contents.trim().to_owned();
                    results.triage.public = Some(link.clone());
                    results.triage.internal = Some(link);
                }
                Err(_) => {
                    results.omission_reason =
                        Some("Failed to read triage link from file".to_owned());
                }
            }
        }
        self.results.insert(name.to_owned(), results);
        Ok(output)
    }

    /// Produces local diff images for `name` and records links to them.
    ///
    /// Only meaningful in local mode.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside local mode, if the output
    /// directory cannot be prepared, or if `goldctl` cannot be run.
    pub async fn diff(&mut self, name: &str, png_file: &Path) -> Result<CommandOutput> {
        if !self.config.local_pixel_tests() {
            return Err(anyhow!("Diffs are only supported in local mode"));
        }
        if self.config.bypass_gold_functionality {
            warn!("Not diffing {name} with Gold: Gold functionality is bypassed");
            return Ok(CommandOutput::default());
        }
        let diff_root = self.working_dir.join(DIFF_DIR);
        create_dir_all(&diff_root)
            .with_context(|| format!("creating {}", diff_root.display()))?;
        // Fresh per diff; the test name never becomes a path.
        let output = Builder::new()
            .prefix("diff_")
            .tempdir_in(&diff_root)
            .with_context(|| format!("creating diff directory in {}", diff_root.display()))?;
        let output_dir = output.path().to_path_buf();
        self.diff_dirs.push(output);

        let args = vec![
            "diff".to_owned(),
            "--corpus".to_owned(),
            self.corpus.clone(),
            "--instance".to_owned(),
            public_instance(&self.config.instance),
            "--input".to_owned(),
            png_file.display().to_string(),
            "--test".to_owned(),
            name.to_owned(),
            "--work-dir".to_owned(),
            self.work_dir_arg(),
            "--out-dir".to_owned(),
            output_dir.display().to_string(),
        ];
        let result = self.run_goldctl(args).await?;

        let links = collect_diff_links(&output_dir);
        self.results.entry(name.to_owned()).or_default().local_diff = links;
        Ok(result)
    }
}

/// Finds the given, closest and diff images `goldctl diff` wrote to `dir`.
fn collect_diff_links(dir: &Path) -> LocalDiffLinks {
    let mut links = LocalDiffLinks::default();
    let Ok(entries) = read_dir(dir) else {
        return links;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let slot = if file_name == "diff.png" {
            &mut links.diff
        } else if file_name.starts_with("input-") && file_name.ends_with(".png") {
            &mut links.given
        } else if file_name.starts_with("closest-") && file_name.ends_with(".png") {
            &mut links.closest
        } else {
            continue;
        };
        *slot = file_link(&path);
    }
    links
}

fn file_link(path: &Path) -> Option<String> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Url::from_file_path(&canonical).ok().map(String::from)
}

impl<R: CommandRunner> ComparisonService for GoldSession<R> {
    async fn run_comparison(&mut self, request: &ComparisonRequest<'_>) -> ComparisonOutcome {
        match self.authenticate(request.use_luci).await {
            Ok(output) if output.success() => {}
            Ok(output) => return ComparisonOutcome::new(StatusCode::AuthFailure, output.output),
            Err(err) => return ComparisonOutcome::new(StatusCode::AuthFailure, format!("{err:#}")),
        }
        match self.initialize().await {
            Ok(output) if output.success() => {}
            Ok(output) => return ComparisonOutcome::new(StatusCode::InitFailure, output.output),
            Err(err) => return ComparisonOutcome::new(StatusCode::InitFailure, format!("{err:#}")),
        }

        let compared = match self
            .compare(request.name, request.png_file, request.matching)
            .await
        {
            Ok(output) if output.success() => return ComparisonOutcome::pass(),
            Ok(output) => output,
            Err(err) => return ComparisonOutcome::new(StatusCode::InitFailure, format!("{err:#}")),
        };
        error!("Gold comparison failed: {}", compared.output);

        if !self.config.local_pixel_tests() {
            return ComparisonOutcome::new(StatusCode::ComparisonFailureRemote, compared.output);
        }
        match self.diff(request.name, request.png_file).await {
            Ok(output) if output.success() => {
                ComparisonOutcome::new(StatusCode::ComparisonFailureLocal, compared.output)
            }
            Ok(output) => ComparisonOutcome::new(StatusCode::LocalDiffFailure, output.output),
            Err(err) => ComparisonOutcome::new(StatusCode::LocalDiffFailure, format!("{err:#}")),
        }
    }

    fn triage_links(&self, name: &str) -> TriageLinks {
        self.results
            .get(name)
            .map(|results| results.triage.clone())
            .unwrap_or_default()
    }

    fn triage_link_omission_reason(&self, name: &str) -> String {
        let Some(results) = self.results.get(name) else {
            return format!("No image comparison performed for {name}");
        };
        if let Some(reason) = &results.omission_reason {
            return reason.clone();
        }
        if results.triage.public.is_some() || results.triage.internal.is_some() {
            return format!("Triage links are available for {name}");
        }
        format!("No triage link was recorded for {name}")
    }

    fn local_diff_links(&self, name: &str) -> LocalDiffLinks {
        self.results
            .get(name)
            .map(|results| results.local_diff.clone())
            .unwrap_or_default()
    }
}

/// Owns one [`GoldSession`] per distinct identity, corpus and instance.
pub struct SessionManager<R> {
    runner: R,
    config: GoldConfig,
    root: PathBuf,
    sessions: HashMap<String, GoldSession<R>>,
}

impl<R: CommandRunner + Clone> SessionManager<R> {
    /// Creates a manager placing session work directories under `root`.
    #[must_use]
    pub fn new(runner: R, config: GoldConfig, root: PathBuf) -> Self {
        Self {
            runner,
            config,
            root,
            sessions: HashMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &GoldConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Returns the session for `identity`, creating it on first use.
    ///
    /// `corpus` defaults to the configured corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if a new session's work directory cannot be set up.
    pub fn session(
        &mut self,
        identity: &RenderingIdentity,
        corpus: Option<&str>,
    ) -> Result<&mut GoldSession<R>> {
        let corpus = corpus.unwrap_or(&self.config.corpus).to_owned();
        let key = format!(
            "{}|{corpus}|{}",
            identity.to_json()?,
            self.config.instance
        );
        let index = self.sessions.len();
        match self.sessions.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let working_dir = self.root.join(format!("session_{index}"));
                let session = GoldSession::new(
                    self.runner.clone(),
                    self.config.clone(),
                    working_dir,
                    identity,
                    &corpus,
                )?;
                Ok(entry.insert(session))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Answers every `goldctl` subcommand with a fixed result and records
    /// the calls.
    #[derive(Clone, Default)]
    struct FakeRunner {
        calls: Rc<RefCell<Vec<Vec<String>>>>,
        compare_exit: i32,
        triage_link: Option<String>,
        diff_images: Rc<Cell<bool>>,
    }

    fn flag_value(args: &[String], flag: &str) -> PathBuf {
        let index = args.iter().position(|arg| arg == flag).unwrap_or(0);
        PathBuf::from(&args[index + 1])
    }

    impl CommandRunner for FakeRunner {
        async fn run(&self, _program: &Path, args: &[String]) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(args.to_vec());
            if args.first().map(String::as_str) == Some("imgtest")
                && args.get(1).map(String::as_str) == Some("add")
            {
                if let Some(link) = self.triage_link.as_ref().filter(|_| self.compare_exit != 0) {
                    write(flag_value(args, "--work-dir").join(TRIAGE_LINK_FILE), link)?;
                }
                return Ok(CommandOutput::new(self.compare_exit, "compare output"));
            }
            if args.first().map(String::as_str) == Some("diff") && self.diff_images.get() {
                let out_dir = flag_value(args, "--out-dir");
                for name in ["input-abc.png", "closest-def.png", "diff.png"] {
                    write(out_dir.join(name), b"")?;
                }
            }
            Ok(CommandOutput::new(0, "ok"))
        }
    }

    fn bot_config() -> GoldConfig {
        GoldConfig {
            local_pixel_tests: Some(false),
            git_revision: Some("abc".to_owned()),
            ..GoldConfig::default()
        }
    }

    fn request<'req>(png: &'req Path, matching: &'req MatchingAlgorithm) -> ComparisonRequest<'req> {
        ComparisonRequest {
            name: "Pixel_Canvas2DRedBox",
            png_file: png,
            matching,
            use_luci: true,
        }
    }

    #[tokio::test]
    async fn pass_authenticates_and_initializes_once() -> Result<()> {
        let dir = TempDir::new()?;
        let runner = FakeRunner::default();
        let calls = Rc::clone(&runner.calls);
        let mut session = GoldSession::new(
            runner,
            bot_config(),
            dir.path().join("work"),
            &RenderingIdentity::default(),
            "chrome-gpu",
        )?;
        let png = dir.path().join("image.png");
        let matching = MatchingAlgorithm::Exact;

        assert!(session.run_comparison(&request(&png, &matching)).await.is_pass());
        assert!(session.run_comparison(&request(&png, &matching)).await.is_pass());

        let calls = calls.borrow();
        let subcommands: Vec<&str> = calls.iter().map(|call| call[0].as_str()).collect();
        assert_eq!(subcommands, ["auth", "imgtest", "imgtest", "imgtest"]);
        assert!(calls[0].contains(&"--luci".to_owned()));
        assert!(!calls[2].contains(&"--dryrun".to_owned()));
        assert_eq!(
            session.triage_link_omission_reason("Pixel_Canvas2DRedBox"),
            "Comparison succeeded, no triage link"
        );
        Ok(())
    }

    #[tokio::test]
    async fn remote_mismatch_reads_triage_link() -> Result<()> {
        let dir = TempDir::new()?;
        let runner = FakeRunner {
            compare_exit: 1,
            triage_link: Some("https://chrome-gpu-gold.skia.org/detail?test=x\n".to_owned()),
            ..FakeRunner::default()
        };
        let mut session = GoldSession::new(
            runner,
            bot_config(),
            dir.path().join("work"),
            &RenderingIdentity::default(),
            "chrome-gpu",
        )?;
        let png = dir.path().join("image.png");
        let matching = MatchingAlgorithm::Exact;
        let outcome = session.run_comparison(&request(&png, &matching)).await;
        assert_eq!(outcome.status, StatusCode::ComparisonFailureRemote);
        assert_eq!(
            session.triage_links("Pixel_Canvas2DRedBox").internal.as_deref(),
            Some("https://chrome-gpu-gold.skia.org/detail?test=x")
        );
        Ok(())
    }

    #[tokio::test]
    async fn remote_mismatch_without_link_records_reason() -> Result<()> {
        let dir = TempDir::new()?;
        let runner = FakeRunner {
            compare_exit: 1,
            ..FakeRunner::default()
        };
        let mut session = GoldSession::new(
            runner,
            bot_config(),
            dir.path().join("work"),
            &RenderingIdentity::default(),
            "chrome-gpu",
        )?;
        let png = dir.path().join("image.png");
        let matching = MatchingAlgorithm::Exact;
        session.run_comparison(&request(&png, &matching)).await;
        assert_eq!(
            session.triage_links("Pixel_Canvas2DRedBox"),
            TriageLinks::default()
        );
        assert_eq!(
            session.triage_link_omission_reason("Pixel_Canvas2DRedBox"),
            "Failed to read triage link from file"
        );
        assert_eq!(
            session.triage_link_omission_reason("Never_Compared"),
            "No image comparison performed for Never_Compared"
        );
        Ok(())
    }

    #[tokio::test]
    async fn tryjob_gets_cl_link() -> Result<()> {
        let dir = TempDir::new()?;
        let runner = FakeRunner {
            compare_exit: 1,
            ..FakeRunner::default()
        };
        let calls = Rc::clone(&runner.calls);
        let config = GoldConfig {
            issue: Some("4242".to_owned()),
            patchset: Some("3".to_owned()),
            job_id: Some("99".to_owned()),
            ..bot_config()
        };
        let mut session = GoldSession::new(
            runner,
            config,
            dir.path().join("work"),
            &RenderingIdentity::default(),
            "chrome-gpu",
        )?;
        let png = dir.path().join("image.png");
        let matching = MatchingAlgorithm::Exact;
        session.run_comparison(&request(&png, &matching)).await;
        assert_eq!(
            session.triage_links("Pixel_Canvas2DRedBox").internal.as_deref(),
            Some("https://chrome-gpu-gold.skia.org/cl/gerrit/4242")
        );
        let calls = calls.borrow();
        let init = &calls[1];
        for flag in ["--issue", "--patchset", "--jobid", "--crs", "--cis"] {
            assert!(init.contains(&flag.to_owned()), "missing {flag}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn bypass_skips_goldctl() -> Result<()> {
        let dir = TempDir::new()?;
        let runner = FakeRunner {
            compare_exit: 1,
            ..FakeRunner::default()
        };
        let calls = Rc::clone(&runner.calls);
        let config = GoldConfig {
            bypass_gold_functionality: true,
            ..bot_config()
        };
        let mut session = GoldSession::new(
            runner,
            config,
            dir.path().join("work"),
            &RenderingIdentity::default(),
            "chrome-gpu",
        )?;
        let png = dir.path().join("image.png");
        let matching = MatchingAlgorithm::Exact;
        assert!(session.run_comparison(&request(&png, &matching)).await.is_pass());
        assert!(calls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn diff_links_found_by_name() -> Result<()> {
        let dir = TempDir::new()?;
        for name in ["input-abc.png", "closest-def.png", "diff.png", "notes.txt"] {
            write(dir.path().join(name), b"")?;
        }
        let links = collect_diff_links(dir.path());
        assert!(links.given.is_some_and(|link| link.ends_with("input-abc.png")));
        assert!(links.closest.is_some_and(|link| link.starts_with("file://")));
        assert!(links.diff.is_some());
        Ok(())
    }

    #[test]
    fn sessions_are_shared_per_identity() -> Result<()> {
        let dir = TempDir::new()?;
        let mut manager =
            SessionManager::new(FakeRunner::default(), bot_config(), dir.path().to_path_buf());
        let identity = RenderingIdentity::default();
        let first = manager.session(&identity, None)?.working_dir().to_path_buf();
        let again = manager.session(&identity, None)?.working_dir().to_path_buf();
        assert_eq!(first, again);
        manager.session(&identity, Some("other-corpus"))?;
        assert_eq!(manager.session_count(), 2);
        let keys_file = manager.session(&identity, None)?.keys_file().to_path_buf();
        assert_eq!(keys_file, first.join(KEYS_FILE));
        assert!(keys_file.exists());
        Ok(())
    }

    #[tokio::test]
    async fn each_local_diff_gets_a_fresh_directory() -> Result<()> {
        let dir = TempDir::new()?;
        let runner = FakeRunner {
            compare_exit: 1,
            ..FakeRunner::default()
        };
        let diff_images = Rc::clone(&runner.diff_images);
        let calls = Rc::clone(&runner.calls);
        let config = GoldConfig {
            local_pixel_tests: Some(true),
            ..bot_config()
        };
        let work_dir = dir.path().join("work");
        let mut session = GoldSession::new(
            runner,
            config,
            work_dir.clone(),
            &RenderingIdentity::default(),
            "chrome-gpu",
        )?;
        let png = dir.path().join("image.png");
        let matching = MatchingAlgorithm::Exact;

        diff_images.set(true);
        let outcome = session.run_comparison(&request(&png, &matching)).await;
        assert_eq!(outcome.status, StatusCode::ComparisonFailureLocal);
        assert!(session.local_diff_links("Pixel_Canvas2DRedBox").given.is_some());

        // Nothing written this time; the first diff's images must not show up.
        diff_images.set(false);
        session.run_comparison(&request(&png, &matching)).await;
        assert_eq!(
            session.local_diff_links("Pixel_Canvas2DRedBox"),
            LocalDiffLinks::default()
        );

        let out_dirs: Vec<PathBuf> = calls
            .borrow()
            .iter()
            .filter(|call| call[0] == "diff")
            .map(|call| flag_value(call, "--out-dir"))
            .collect();
        assert_eq!(out_dirs.len(), 2);
        assert_ne!(out_dirs[0], out_dirs[1]);
        for out_dir in &out_dirs {
            assert_eq!(out_dir.parent(), Some(work_dir.join(DIFF_DIR).as_path()));
        }
        Ok(())
    }

    #[tokio::test]
    async fn diff_directory_ignores_test_name() -> Result<()> {
        let dir = TempDir::new()?;
        let runner = FakeRunner::default();
        let calls = Rc::clone(&runner.calls);
        let config = GoldConfig {
            local_pixel_tests: Some(true),
            ..bot_config()
        };
        let work_dir = dir.path().join("work");
        let mut session = GoldSession::new(
            runner,
            config,
            work_dir.clone(),
            &RenderingIdentity::default(),
            "chrome-gpu",
        )?;
        session.diff("../../outside", &dir.path().join("image.png")).await?;

        let out_dir = flag_value(&calls.borrow()[0], "--out-dir");
        assert!(out_dir.starts_with(work_dir.join(DIFF_DIR)));
        assert!(!dir.path().join("outside").exists());
        Ok(())
    }
}
