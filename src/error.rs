use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP error! status: {status} ({url})")]
    Status { url: String, status: u16 },
}

/// An article element that lacks one of the fields needed to store it.
#[derive(Debug, Error)]
#[error("skipping invalid article ({title}): missing {missing}")]
pub struct ExtractError {
    pub title: String,
    pub missing: &'static str,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("writer data is not correct: {name:?} is missing {missing}")]
    DirectoryIntegrity { name: String, missing: &'static str },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
