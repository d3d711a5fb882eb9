//! Error types for the pixel comparison harness.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Message attached to a comparison failure that reaches the test runner.
pub const COMPARISON_FAILED_MESSAGE: &str = "goldctl command failed, see above for details";

/// Harness errors that abort or fail a test.
///
/// Infrastructure failures (file I/O, PNG encoding) travel as `anyhow::Error`
/// instead; these variants are the ones callers are expected to match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoldError {
    /// The browser reported no GPU section at all.
    MissingGpuInfo,
    /// Neither ids, strings, nor a software fallback identified the GPU.
    IncompleteDeviceInfo,
    /// The run configuration is inconsistent.
    InvalidConfig(String),
    /// An inexact matching algorithm was given unusable parameters.
    InvalidMatchingParameters(String),
    /// A comparison failure that must be reported to the test runner.
    ComparisonFailed,
}

impl Display for GoldError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MissingGpuInfo => write!(formatter, "GPU information was absent"),
            Self::IncompleteDeviceInfo => {
                write!(formatter, "GPU device information was incomplete")
            }
            Self::InvalidConfig(msg) => write!(formatter, "Invalid Gold configuration: {msg}"),
            Self::InvalidMatchingParameters(msg) => {
                write!(formatter, "Invalid matching parameters: {msg}")
            }
            Self::ComparisonFailed => write!(formatter, "{COMPARISON_FAILED_MESSAGE}"),
        }
    }
}

impl Error for GoldError {}
