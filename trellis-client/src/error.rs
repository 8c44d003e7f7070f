use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("fragment `{fragment_id}` has no <trellis-slot> for the next fragment")]
    MissingSlot { fragment_id: String },

    #[error("navigation request failed: {0}")]
    Fetch(String),

    #[error("malformed navigation payload")]
    Decode(#[from] serde_json::Error),

    #[error("gave up after {limit} redirects")]
    TooManyRedirects { limit: usize },

    #[error("invalid navigation target")]
    InvalidUrl(#[from] url::ParseError),

    #[error("dom: {0}")]
    Dom(String),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
