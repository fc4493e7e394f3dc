use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::error::ConfigError;

/// A validated feed locator. Supports local files (`file://dir/feed.xml`)
/// and remote documents (`http://` / `https://`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    url: Url,
}

impl FeedSource {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        let url = Url::parse(trimmed).map_err(|source| ConfigError::InvalidFeedUrl {
            url: trimmed.to_string(),
            source,
        })?;
        match url.scheme() {
            "file" | "http" | "https" => Ok(FeedSource { url }),
            scheme => Err(ConfigError::UnsupportedScheme {
                url: trimmed.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }

    /// The full locator string; used as the metric-registry key and as the
    /// feed context on publish results.
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    pub fn is_file(&self) -> bool {
        self.url.scheme() == "file"
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host with dots replaced by underscores, for embedding into
    /// Prometheus metric names.
    pub fn host_label(&self) -> String {
        self.url.host_str().unwrap_or_default().replace('.', "_")
    }

    /// Local path for `file` URLs. The host segment is treated as the
    /// first path component, so `file://testdata/feed.xml` maps to
    /// `testdata/feed.xml` (relative) and `file:///data/feed.xml` to
    /// `/data/feed.xml` (absolute).
    pub fn file_path(&self) -> PathBuf {
        let host = self.url.host_str().unwrap_or_default();
        PathBuf::from(format!("{}{}", host, self.url.path()))
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_schemes() {
        for input in [
            "file://testdata/feed.xml",
            "http://example.com/feed.xml",
            "https://example.com/feed.xml",
        ] {
            FeedSource::parse(input).expect(input);
        }
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err = FeedSource::parse("ftp://example.com/feed.xml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));
    }

    #[test]
    fn rejects_garbage() {
        let err = FeedSource::parse("not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFeedUrl { .. }));
    }

    #[test]
    fn file_path_joins_host_and_path() {
        let feed = FeedSource::parse("file://testdata/feed.xml").unwrap();
        assert_eq!(feed.file_path(), PathBuf::from("testdata/feed.xml"));

        let feed = FeedSource::parse("file:///var/feeds/shop.xml").unwrap();
        assert_eq!(feed.file_path(), PathBuf::from("/var/feeds/shop.xml"));
    }

    #[test]
    fn host_label_replaces_dots() {
        let feed = FeedSource::parse("https://www.example.com/feed.xml").unwrap();
        assert_eq!(feed.host_label(), "www_example_com");
    }
}
