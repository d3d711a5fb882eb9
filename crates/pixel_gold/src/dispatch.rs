//! Turning comparison outcomes into diagnostics.
//!
//! Every non-passing outcome is logged here, before any decision about
//! whether it fails the test, so a suppressed failure still leaves a trail.

use crate::artifacts::ArtifactSink;
use crate::outcome::{ComparisonOutcome, StatusCode};
use crate::session::ComparisonService;
use log::error;

/// Link name used for the change-list level triage link of a try job.
pub const CL_TRIAGE_LINK_NAME: &str = "triage_link_for_entire_cl";
/// Link name used for a per-image triage link.
pub const IMAGE_TRIAGE_LINK_NAME: &str = "gold_triage_link";
/// Placeholder logged when a local diff image has no link.
pub const MISSING_LINK_MESSAGE: &str = "Unable to retrieve link";

/// Diagnostics produced for one outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Lines logged at error level, in order.
    pub messages: Vec<String>,
    /// `(name, url)` pairs handed to the artifact sink.
    pub links: Vec<(String, String)>,
}

impl DispatchReport {
    fn log(&mut self, message: String) {
        error!("{message}");
        self.messages.push(message);
    }

    fn link(&mut self, artifacts: &mut dyn ArtifactSink, name: &str, url: &str) {
        artifacts.create_link(name, url);
        self.links.push((name.to_owned(), url.to_owned()));
    }
}

/// Logs and links the outcome of comparing `image_name`.
///
/// `tryjob` selects one aggregate triage link per change list instead of a
/// per-image link.
pub fn dispatch_outcome<S: ComparisonService>(
    outcome: &ComparisonOutcome,
    image_name: &str,
    service: &S,
    tryjob: bool,
    artifacts: &mut dyn ArtifactSink,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    let detail = outcome.message_or_empty();
    match &outcome.status {
        StatusCode::Success => {}
        StatusCode::AuthFailure => {
            report.log(format!("Gold authentication failed with output {detail}"));
        }
        StatusCode::InitFailure => {
            report.log(format!("Gold initialization failed with output {detail}"));
        }
        StatusCode::ComparisonFailureRemote => {
            // There is no public mirror for every instance, so the internal
            // link is the one that always points at the right place.
            match service.triage_links(image_name).internal {
                Some(link) if tryjob => report.link(artifacts, CL_TRIAGE_LINK_NAME, &link),
                Some(link) => report.link(artifacts, IMAGE_TRIAGE_LINK_NAME, &link),
                None => {
                    report.log(format!(
                        "Failed to get triage link for {image_name}, raw output: {detail}"
                    ));
                    report.log(format!(
                        "Reason for no triage link: {}",
                        service.triage_link_omission_reason(image_name)
                    ));
                }
            }
        }
        StatusCode::ComparisonFailureLocal => {
            report.log("Local comparison failed. Local diff files:".to_owned());
            log_local_diff_files(&mut report, service, image_name);
        }
        StatusCode::LocalDiffFailure => {
            report.log(format!(
                "Local comparison failed and an error occurred during diff generation: {detail}"
            ));
            // Some files may still have been written.
            report.log("Local diff files:".to_owned());
            log_local_diff_files(&mut report, service, image_name);
        }
        StatusCode::Unknown(code) => {
            report.log(format!(
                "Given unhandled Gold status code {code} with error {detail}"
            ));
        }
    }
    report
}

fn log_local_diff_files<S: ComparisonService>(
    report: &mut DispatchReport,
    service: &S,
    image_name: &str,
) {
    let links = service.local_diff_links(image_name);
    let or_missing = |link: Option<String>| link.unwrap_or_else(|| MISSING_LINK_MESSAGE.to_owned());
    report.log(format!("Generated image: {}", or_missing(links.given)));
    report.log(format!("Closest image: {}", or_missing(links.closest)));
    report.log(format!("Diff image: {}", or_missing(links.diff)));
}
