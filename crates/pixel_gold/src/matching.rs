//! Inexact image matching configuration.
//!
//! The comparison service supports fuzzy and Sobel-filtered matching in
//! addition to exact matching. A test opts in by attaching optional keys to
//! its comparison; this module builds those arguments.

use crate::error::GoldError;
use std::fmt::{Display, Formatter, Result as FmtResult};

const OPTIONAL_KEY_FLAG: &str = "--add-test-optional-key";
const ALGORITHM_KEY: &str = "image_matching_algorithm";
const MAX_DIFFERENT_PIXELS_KEY: &str = "fuzzy_max_different_pixels";
const PIXEL_DELTA_THRESHOLD_KEY: &str = "fuzzy_pixel_delta_threshold";
const IGNORED_BORDER_THICKNESS_KEY: &str = "fuzzy_ignored_border_thickness";
const EDGE_THRESHOLD_KEY: &str = "sobel_edge_threshold";

/// Parameters shared by fuzzy and Sobel matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuzzyParameters {
    /// Number of pixels allowed to differ.
    pub max_different_pixels: u32,
    /// Summed per-channel delta below which a pixel still counts as equal.
    pub pixel_delta_threshold: u32,
    /// Border width, in pixels, excluded from the comparison.
    pub ignored_border_thickness: u32,
}

/// How a candidate image is matched against its baselines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchingAlgorithm {
    #[default]
    Exact,
    Fuzzy(FuzzyParameters),
    /// Fuzzy matching restricted to pixels that are not on a detected edge.
    Sobel {
        fuzzy: FuzzyParameters,
        edge_threshold: EdgeThreshold,
    },
}

/// Sobel edge threshold, always below 255.
///
/// At 255 no pixel counts as an edge, which is just exact matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeThreshold(u8);

impl EdgeThreshold {
    /// # Errors
    ///
    /// Returns [`GoldError::InvalidMatchingParameters`] for a threshold of 255.
    pub fn new(threshold: u8) -> Result<Self, GoldError> {
        if threshold == u8::MAX {
            return Err(GoldError::InvalidMatchingParameters(
                "Sobel edge threshold of 255 is the same as exact matching".to_owned(),
            ));
        }
        Ok(Self(threshold))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Display for EdgeThreshold {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        write!(formatter, "{}", self.0)
    }
}

impl MatchingAlgorithm {
    #[inline]
    #[must_use]
    pub const fn fuzzy(max_different_pixels: u32, pixel_delta_threshold: u32) -> Self {
        Self::Fuzzy(FuzzyParameters {
            max_different_pixels,
            pixel_delta_threshold,
            ignored_border_thickness: 0,
        })
    }

    /// Sobel matching with the given edge threshold.
    ///
    /// # Errors
    ///
    /// Returns [`GoldError::InvalidMatchingParameters`] for a threshold of
    /// 255: no pixel would count as an edge, which is just exact matching.
    pub fn sobel(fuzzy: FuzzyParameters, edge_threshold: u8) -> Result<Self, GoldError> {
        Ok(Self::Sobel {
            fuzzy,
            edge_threshold: EdgeThreshold::new(edge_threshold)?,
        })
    }

    /// Name reported to the comparison service.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy(_) => "fuzzy",
            Self::Sobel { .. } => "sobel",
        }
    }

    /// Command line arguments selecting this algorithm; empty for exact.
    #[must_use]
    pub fn command_line(&self) -> Vec<String> {
        let (fuzzy, edge_threshold) = match *self {
            Self::Exact => return Vec::new(),
            Self::Fuzzy(fuzzy) => (fuzzy, None),
            Self::Sobel {
                fuzzy,
                edge_threshold,
            } => (fuzzy, Some(edge_threshold)),
        };
        let mut pairs = vec![
            (ALGORITHM_KEY, self.name().to_owned()),
            (MAX_DIFFERENT_PIXELS_KEY, fuzzy.max_different_pixels.to_string()),
            (PIXEL_DELTA_THRESHOLD_KEY, fuzzy.pixel_delta_threshold.to_string()),
            (
                IGNORED_BORDER_THICKNESS_KEY,
                fuzzy.ignored_border_thickness.to_string(),
            ),
        ];
        if let Some(threshold) = edge_threshold {
            pairs.push((EDGE_THRESHOLD_KEY, threshold.get().to_string()));
        }
        pairs
            .into_iter()
            .flat_map(|(key, value)| [OPTIONAL_KEY_FLAG.to_owned(), format!("{key}:{value}")])
            .collect()
    }
}

impl Display for MatchingAlgorithm {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Exact => write!(formatter, "exact"),
            Self::Fuzzy(fuzzy) => write!(
                formatter,
                "fuzzy (max {} pixels, delta {}, border {})",
                fuzzy.max_different_pixels,
                fuzzy.pixel_delta_threshold,
                fuzzy.ignored_border_thickness
            ),
            Self::Sobel {
                fuzzy,
                edge_threshold,
            } => write!(
                formatter,
                "sobel (edge {edge_threshold}, max {} pixels, delta {}, border {})",
                fuzzy.max_different_pixels,
                fuzzy.pixel_delta_threshold,
                fuzzy.ignored_border_thickness
            ),
        }
    }
}
