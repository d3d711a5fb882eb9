//! Whether a non-passing comparison fails the test.

use crate::grace::GracePeriod;
use crate::outcome::ComparisonOutcome;
use jiff::civil::Date;

/// Decides whether `outcome` must be reported as a test failure.
///
/// Failures are suppressed when the run ignores comparison failures
/// globally, or while the test's grace period covers `today`. Passing
/// outcomes never surface.
#[must_use]
pub fn should_surface(
    outcome: &ComparisonOutcome,
    grace_period: &GracePeriod,
    no_gold_failure: bool,
    today: Date,
) -> bool {
    if outcome.is_pass() || no_gold_failure {
        return false;
    }
    !grace_period.is_active_on(today)
}
