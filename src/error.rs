use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single `/query` exchange.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unable to build http client")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to retrieve data from server: status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected reply body")]
    Decode(#[source] serde_json::Error),
}

/// Root cause of a failed pulse id lookup.
#[derive(Debug, Error)]
pub enum ResolveFailure {
    #[error("query service request failed")]
    Transport(#[source] ServiceError),

    #[error("archive has not caught up to pulse id {requested}, latest known is {latest}")]
    Stale { requested: u64, latest: u64 },

    #[error("didn't get good response from data api: {0}")]
    Malformed(String),

    #[error("no exact match after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

#[derive(Debug, Error)]
#[error("unable to retrieve pulse_id date mapping for pulse id {pulse_id}")]
pub struct ResolutionError {
    pub pulse_id: u64,
    #[source]
    pub cause: ResolveFailure,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unable to retrieve data from server after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("malformed data reply: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("table encoding failed")]
    Encode(#[from] bincode::Error),

    #[error("{} already exists and overwrite is disabled", .0.display())]
    AlreadyExists(PathBuf),

    #[error("unsupported write option: {0}")]
    Unsupported(&'static str),

    #[error("{} is not a table file", .0.display())]
    BadHeader(PathBuf),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid export request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unable to persist data")]
    Persist(#[from] PersistError),

    #[error("unable to create no-data marker for {}", .path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
