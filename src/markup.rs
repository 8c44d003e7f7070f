//! Regex-level surgery on rendered markup: placeholder elements, island
//! tagging and fragment wrappers.

use crate::error::{Error, Result};
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;
use trellis_protocol::markers::{FRAG_ID_ATTR, FRAG_TAG, ISLAND_TAG, SLOT_TAG};

/// Attribute list of an open tag, quoted values may contain `>`.
const ATTRS: &str = r#"(?:\s+[^\s=/>]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*"#;

static SLOT: LazyLock<Regex> = LazyLock::new(|| placeholder_regex(SLOT_TAG));

static ISLAND_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)<{ISLAND_TAG}({ATTRS})\s*>")).expect("valid island regex")
});

static SELF_CLOSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)<({SLOT_TAG}|{ISLAND_TAG})({ATTRS})\s*/>"))
        .expect("valid self-closing regex")
});

static FRAG_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?i)\s+{FRAG_ID_ATTR}(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?(?P<end>\s|$)"#
    ))
    .expect("valid attribute regex")
});

/// Matches `<tag ...></tag>`, `<tag ... />` and `<tag ...>anything</tag>`.
pub(crate) fn placeholder_regex(tag: &str) -> Regex {
    Regex::new(&format!(
        r"(?is)<{tag}{ATTRS}\s*(?:/>|>.*?</{tag}\s*>)"
    ))
    .expect("valid placeholder regex")
}

/// Byte range of the first `regex` match in `html`.
pub(crate) fn find_first(regex: &Regex, html: &str) -> Option<Range<usize>> {
    regex.find(html).map(|m| m.range())
}

pub(crate) fn splice(html: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(html.len() - range.len() + replacement.len());
    out.push_str(&html[..range.start]);
    out.push_str(replacement);
    out.push_str(&html[range.end..]);
    out
}

/// Replaces the single slot placeholder of `fragment_id`'s body with `child`.
pub(crate) fn fill_slot(fragment_id: &str, body: &str, child: &str) -> Result<String> {
    let mut slots = SLOT.find_iter(body);
    let Some(slot) = slots.next() else {
        return Err(Error::MissingSlot {
            fragment_id: fragment_id.to_string(),
        });
    };
    if slots.next().is_some() {
        return Err(Error::DuplicateSlot {
            fragment_id: fragment_id.to_string(),
        });
    }
    Ok(splice(body, slot.range(), child))
}

/// Rewrites `<trellis-slot/>` and `<trellis-island .../>` as paired tags.
/// HTML parsers ignore `/>` on custom elements, so a self-closing slot would
/// swallow its following siblings once a browser parses the fragment.
pub(crate) fn pair_self_closing(body: &str) -> String {
    SELF_CLOSING
        .replace_all(body, |caps: &regex::Captures<'_>| {
            let tag = caps[1].to_ascii_lowercase();
            format!("<{tag}{}></{tag}>", &caps[2])
        })
        .into_owned()
}

/// Sets `data-frag-id` on every island element, replacing any value
/// already present.
pub(crate) fn tag_islands(body: &str, fragment_id: &str) -> String {
    let id = escape_attr(fragment_id);
    ISLAND_OPEN
        .replace_all(body, |caps: &regex::Captures<'_>| {
            let attrs = FRAG_ID.replace_all(&caps[1], "$end");
            format!(r#"<{ISLAND_TAG}{attrs} {FRAG_ID_ATTR}="{id}">"#)
        })
        .into_owned()
}

pub(crate) fn wrap_fragment(fragment_id: &str, body: &str) -> String {
    format!(
        r#"<{FRAG_TAG} {FRAG_ID_ATTR}="{}">{body}</{FRAG_TAG}>"#,
        escape_attr(fragment_id)
    )
}

pub(crate) fn escape_attr(value: &str) -> String {
    v_htmlescape::escape(value).to_string()
}
