//! The contract between the trellis server and the client runtime: fragment
//! stacks, the navigation endpoint's payloads and the names both sides agree on.

pub mod markers;

use serde::{Deserialize, Serialize};

/// One rendered layout or page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRenderResult {
    pub id: String,
    pub head: String,
    pub body: String,
}

/// A page's fragment stack, outermost layout first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingData {
    pub layouts: Vec<FragmentRenderResult>,
    pub page: FragmentRenderResult,
}

impl RenderingData {
    /// A layout-less stack holding only `page`.
    pub fn page_only(page: FragmentRenderResult) -> Self {
        Self {
            layouts: Vec::new(),
            page,
        }
    }

    /// `[...layouts, page]`.
    pub fn fragments(&self) -> impl Iterator<Item = &FragmentRenderResult> {
        self.layouts.iter().chain(std::iter::once(&self.page))
    }

    pub fn into_fragments(self) -> Vec<FragmentRenderResult> {
        let mut fragments = self.layouts;
        fragments.push(self.page);
        fragments
    }

    pub fn fragment_ids(&self) -> Vec<&str> {
        self.fragments().map(|fragment| fragment.id.as_str()).collect()
    }
}

/// Body of a successful navigation endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NavigationResponse {
    Redirect {
        location: String,
    },
    Page {
        #[serde(rename = "renderingData")]
        rendering_data: RenderingData,
    },
}

/// Anything the navigation endpoint may answer with. The not-found case is a
/// bare [`RenderingData`] sent with status 404.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NavigationPayload {
    Response(NavigationResponse),
    Bare(RenderingData),
}

impl NavigationPayload {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Redirect target, if the payload asks for one.
    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            Self::Response(NavigationResponse::Redirect { location }) => Some(location),
            _ => None,
        }
    }

    pub fn into_rendering_data(self) -> Option<RenderingData> {
        match self {
            Self::Response(NavigationResponse::Page { rendering_data }) => Some(rendering_data),
            Self::Bare(rendering_data) => Some(rendering_data),
            Self::Response(NavigationResponse::Redirect { .. }) => None,
        }
    }
}

/// Number of leading ids `incoming` and `current` agree on.
pub fn common_prefix_len<A, B>(incoming: &[A], current: &[B]) -> usize
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    incoming
        .iter()
        .zip(current)
        .take_while(|(a, b)| a.as_ref() == b.as_ref())
        .count()
}

/// Serializes `value` as JSON that can sit inside an inline `<script>`.
pub fn to_script_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_string(value)?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    Ok(escaped)
}
