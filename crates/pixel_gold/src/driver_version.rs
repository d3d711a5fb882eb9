//! Driver version normalisation.
//!
//! ANGLE appends a build revision (e.g. `2.1.0.b50541b2d6c4`) to its driver
//! version. Every revision would otherwise become its own trace on the
//! comparison service, so the revision is dropped before the version is
//! used as an identity key.

/// Driver vendor substring that marks a driver version as carrying a revision.
const REVISIONED_DRIVER_FAMILY: &str = "ANGLE";

/// Components longer than this are treated as opaque revisions.
const MAX_COMPONENT_LEN: usize = 8;

/// Strips the trailing revision off a driver version owned by ANGLE.
///
/// Components are kept up to, but excluding, the first one longer than eight
/// characters. Versions of other driver families, and empty versions, are
/// returned unchanged. Applying this twice gives the same result as once.
pub fn strip_driver_revision(driver_vendor: &str, driver_version: &str) -> String {
    if !driver_vendor.contains(REVISIONED_DRIVER_FAMILY) || driver_version.is_empty() {
        return driver_version.to_owned();
    }
    driver_version
        .split('.')
        .take_while(|part| part.len() <= MAX_COMPONENT_LEN)
        .collect::<Vec<_>>()
        .join(".")
}
