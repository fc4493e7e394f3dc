use thiserror::Error;

use crate::decoder::DecodeError;

/// Startup-time configuration failures. All of these are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("feed url '{url}' could not be parsed: {source}")]
    InvalidFeedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("feed url '{url}' has unsupported scheme '{scheme}'")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("no feed urls were provided")]
    NoFeeds,
    #[error("invalid duration literal '{0}'")]
    InvalidDuration(String),
}

/// Failures scoped to a single feed within a single pass. The pass keeps
/// going for the other feeds.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("unable to open feed file '{url}': {source}")]
    OpenFile {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to fetch feed '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to process feed '{url}': {source}")]
    Decode {
        url: String,
        #[source]
        source: DecodeError,
    },
    #[error("a feed runner panicked")]
    RunnerPanicked,
}

/// Terminal outcomes of a run, mapped to a non-zero exit code by the
/// server binary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("failed to start kafka producer: {0}")]
    SinkInit(#[source] anyhow::Error),
    #[error("feed pass completed with {} error(s)", .0.len())]
    PassFailed(Vec<FeedError>),
    #[error("received termination signal, exiting")]
    Terminated,
}
