//! Named links surfaced to the test runner.

/// Receives named diagnostic links for the current test.
pub trait ArtifactSink {
    fn create_link(&mut self, name: &str, url: &str);
}

/// In-memory [`ArtifactSink`] keeping links in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedArtifacts {
    links: Vec<(String, String)>,
}

impl RecordedArtifacts {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { links: Vec::new() }
    }

    #[inline]
    #[must_use]
    pub fn links(&self) -> &[(String, String)] {
        &self.links
    }

    /// The most recent link recorded under `name`.
    #[must_use]
    pub fn link(&self, name: &str) -> Option<&str> {
        self.links
            .iter()
            .rev()
            .find(|(link_name, _)| link_name == name)
            .map(|(_, url)| url.as_str())
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl ArtifactSink for RecordedArtifacts {
    fn create_link(&mut self, name: &str, url: &str) {
        self.links.push((name.to_owned(), url.to_owned()));
    }
}
