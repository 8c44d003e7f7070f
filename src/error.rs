use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A fragment has to host a nested child but its body has no slot.
    #[error("fragment `{fragment_id}` must contain a <trellis-slot> to nest its child")]
    MissingSlot { fragment_id: String },
    #[error("fragment `{fragment_id}` contains more than one <trellis-slot>")]
    DuplicateSlot { fragment_id: String },
    #[error("failed to render component `{component}`")]
    Render {
        component: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("handler failed")]
    Handler(#[source] anyhow::Error),
    #[error("invalid configuration at {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] hyper::http::Error),
}
