use crate::error::Result;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trellis_protocol::RenderingData;
use url::Url;

/// What trellis keeps in each session history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryState {
    #[serde(rename = "renderingData")]
    pub rendering_data: RenderingData,
    #[serde(rename = "pageState", default)]
    pub page_state: Value,
}

/// The browser environment outside the document tree.
///
/// The navigator is the only caller of [`Platform::push_state`] and
/// [`Platform::replace_state`]. Native `history.pushState` calls made by
/// other scripts bypass trellis and leave entries it cannot restore from.
pub trait Platform {
    fn location(&self) -> Url;

    /// GETs `url` and returns the body. Any HTTP status is a body.
    fn fetch(&self, url: &Url) -> LocalBoxFuture<'_, Result<Vec<u8>>>;

    fn push_state(&self, state: &HistoryState, url: &Url) -> Result<()>;

    fn replace_state(&self, state: &HistoryState, url: &Url) -> Result<()>;

    /// Leaves the page the ordinary way.
    fn assign(&self, url: &Url);
}
