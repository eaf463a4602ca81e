use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop a run before any request is sent.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read credentials file {path:?}")]
    CredentialsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials file {path:?} line {line}: expected `username password`")]
    MalformedCredentials { path: PathBuf, line: usize },

    #[error("credentials file {0:?} contains no usable credentials")]
    NoCredentials(PathBuf),

    #[error("invalid {name} pattern")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

/// Reasons a single simulated user gives up. Never escalated past its session.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("No site id found")]
    NoSites,

    #[error("No tools for {site_id}")]
    NoTools { site_id: String },

    #[error("No tool iframe in page {page}")]
    NoIframe { page: String },

    #[error("Couldn't get a workspace")]
    NoWorkspace,

    #[error("cannot resolve {path} against the base URL")]
    BadUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
}
