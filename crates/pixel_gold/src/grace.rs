//! Grace periods for newly added pixel tests.

use anyhow::{Context as _, Result};
use jiff::Zoned;
use jiff::civil::Date;

/// Optional end date after which comparison failures of a test count.
///
/// The end date is part of the test's authored metadata and is never changed
/// by the harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GracePeriod {
    end: Option<Date>,
}

impl GracePeriod {
    /// No grace period; failures count immediately.
    #[inline]
    #[must_use]
    pub const fn none() -> Self {
        Self { end: None }
    }

    /// Grace period lasting through `end` (inclusive).
    #[inline]
    #[must_use]
    pub const fn until(end: Date) -> Self {
        Self { end: Some(end) }
    }

    /// Parses an ISO 8601 end date such as `2026-11-30`.
    ///
    /// # Errors
    ///
    /// Returns an error if `end` is not a valid calendar date.
    pub fn parse(end: &str) -> Result<Self> {
        let date: Date = end
            .parse()
            .with_context(|| format!("invalid grace period end date '{end}'"))?;
        Ok(Self::until(date))
    }

    /// The configured end date, if any.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> Option<Date> {
        self.end
    }

    /// Whether the grace period still covers `today`.
    ///
    /// The end date itself is still inside the period.
    #[inline]
    #[must_use]
    pub fn is_active_on(&self, today: Date) -> bool {
        self.end.is_some_and(|end| today <= end)
    }

    /// Whether the grace period covers the current local date.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active_on(local_today())
    }
}

/// The current date in the system time zone.
#[must_use]
pub fn local_today() -> Date {
    Zoned::now().date()
}
