//! Reserved element names, comment markers and paths that the server writes
//! into documents and the client runtime later looks for.

pub const HEAD_TAG: &str = "trellis-head";
pub const BODY_TAG: &str = "trellis-body";
pub const FRAG_TAG: &str = "trellis-frag";
pub const SLOT_TAG: &str = "trellis-slot";
pub const ISLAND_TAG: &str = "trellis-island";

pub const FRAG_ID_ATTR: &str = "data-frag-id";
pub const ISLAND_COMPONENT_ATTR: &str = "component";
pub const ISLAND_PROPS_ATTR: &str = "props";
pub const ISLAND_TRIGGER_ATTR: &str = "trigger";
/// Anchors carrying this attribute always trigger a full page load.
pub const RELOAD_ATTR: &str = "data-trellis-reload";

pub const HEAD_START_COMMENT: &str = "trellis-head";
pub const HEAD_END_COMMENT: &str = "/trellis-head";
const HEADFRAG_START_PREFIX: &str = "trellis-headfrag-";
const HEADFRAG_END_PREFIX: &str = "/trellis-headfrag-";

pub const NAVIGATION_PATH: &str = "/__trellis__/navigation";
pub const NAVIGATION_QUERY: &str = "to";
pub const CLIENT_ASSET_PREFIX: &str = "/__trellis__/client/";
pub const CLIENT_CSS_PREFIX: &str = "/__trellis__/client/css/";

/// Name of the window property the bootstrap script fills in.
pub const BOOTSTRAP_GLOBAL: &str = "__trellis_temp__";

/// Makes the framework's wrapper elements invisible to layout.
pub const WRAPPER_STYLE: &str = "trellis-body, trellis-island, trellis-frag{display:contents;}";

pub fn headfrag_start(id: &str) -> String {
    format!("{HEADFRAG_START_PREFIX}{id}")
}

pub fn headfrag_end(id: &str) -> String {
    format!("{HEADFRAG_END_PREFIX}{id}")
}

/// A comment found among the document head's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadMarker<'a> {
    SectionStart,
    SectionEnd,
    FragmentStart(&'a str),
    FragmentEnd(&'a str),
}

/// Classifies the text of a head comment. Unrelated comments yield `None`.
pub fn parse_head_marker(text: &str) -> Option<HeadMarker<'_>> {
    if text == HEAD_START_COMMENT {
        Some(HeadMarker::SectionStart)
    } else if text == HEAD_END_COMMENT {
        Some(HeadMarker::SectionEnd)
    } else if let Some(id) = text.strip_prefix(HEADFRAG_START_PREFIX) {
        Some(HeadMarker::FragmentStart(id))
    } else if let Some(id) = text.strip_prefix(HEADFRAG_END_PREFIX) {
        Some(HeadMarker::FragmentEnd(id))
    } else {
        None
    }
}
