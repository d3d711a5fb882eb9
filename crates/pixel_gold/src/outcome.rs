//! Comparison outcomes.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Result kind of one comparison.
///
/// Codes are spelled on the wire as `SUCCESS`, `AUTH_FAILURE`, and so on.
/// Codes this build does not know are kept verbatim in [`StatusCode::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusCode {
    Success,
    AuthFailure,
    InitFailure,
    /// The service rejected the image; a triage link may be available.
    ComparisonFailureRemote,
    /// The image did not match in local mode; diff images were produced.
    ComparisonFailureLocal,
    /// The image did not match in local mode and producing diffs failed.
    LocalDiffFailure,
    Unknown(String),
}

impl StatusCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "SUCCESS",
            Self::AuthFailure => "AUTH_FAILURE",
            Self::InitFailure => "INIT_FAILURE",
            Self::ComparisonFailureRemote => "COMPARISON_FAILURE_REMOTE",
            Self::ComparisonFailureLocal => "COMPARISON_FAILURE_LOCAL",
            Self::LocalDiffFailure => "LOCAL_DIFF_FAILURE",
            Self::Unknown(code) => code,
        }
    }
}

impl FromStr for StatusCode {
    type Err = Infallible;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Ok(match code {
            "SUCCESS" => Self::Success,
            "AUTH_FAILURE" => Self::AuthFailure,
            "INIT_FAILURE" => Self::InitFailure,
            "COMPARISON_FAILURE_REMOTE" => Self::ComparisonFailureRemote,
            "COMPARISON_FAILURE_LOCAL" => Self::ComparisonFailureLocal,
            "LOCAL_DIFF_FAILURE" => Self::LocalDiffFailure,
            other => Self::Unknown(other.to_owned()),
        })
    }
}

impl From<String> for StatusCode {
    fn from(code: String) -> Self {
        match code.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<StatusCode> for String {
    fn from(status: StatusCode) -> Self {
        status.as_str().to_owned()
    }
}

impl Display for StatusCode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter.write_str(self.as_str())
    }
}

/// What the comparison session reports back for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    pub status: StatusCode,
    /// Output of the failing step, if any.
    pub message: Option<String>,
}

impl ComparisonOutcome {
    #[inline]
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            status: StatusCode::Success,
            message: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.status == StatusCode::Success
    }

    /// The message, or an empty string.
    #[inline]
    #[must_use]
    pub fn message_or_empty(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}
