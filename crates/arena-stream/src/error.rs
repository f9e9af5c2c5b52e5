use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArenaStreamError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status}")]
    HttpStatus { status: u16 },
    #[error("failed to parse stream event: {source}; frame: {frame}")]
    EventParse {
        frame: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid stream data: {0}")]
    InvalidStream(String),
}
