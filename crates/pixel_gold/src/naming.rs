//! Image names derived from test URLs.

const SCHEMES: [&str; 3] = ["http://", "https://", "file://"];

/// Turns a test page URL into a flat image name.
///
/// The scheme and any slashes after it are dropped, `../` segments are
/// removed, and `.`, `/` and `-` become `_`.
#[must_use]
pub fn image_name_from_url(url: &str) -> String {
    let without_scheme = SCHEMES
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .map_or(url, |rest| rest.trim_start_matches('/'));
    without_scheme
        .replace("../", "")
        .chars()
        .map(|ch| if matches!(ch, '.' | '/' | '-') { '_' } else { ch })
        .collect()
}
