use crate::error::Result;
use crate::markup::{escape_attr, fill_slot, find_first, placeholder_regex, splice, wrap_fragment};
use regex::Regex;
use std::sync::LazyLock;
use trellis_protocol::markers::{
    BODY_TAG, BOOTSTRAP_GLOBAL, HEAD_END_COMMENT, HEAD_START_COMMENT, HEAD_TAG, WRAPPER_STYLE,
    headfrag_end, headfrag_start,
};
use trellis_protocol::{RenderingData, to_script_json};

static HEAD_MARKER: LazyLock<Regex> = LazyLock::new(|| placeholder_regex(HEAD_TAG));
static BODY_MARKER: LazyLock<Regex> = LazyLock::new(|| placeholder_regex(BODY_TAG));

/// Used when a project has no template of its own.
pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<trellis-head></trellis-head>
</head>
<body>
<trellis-body></trellis-body>
</body>
</html>
"#;

/// Scripts injected ahead of the fragment heads.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Emitted first, only in dev mode.
    pub dev_scripts: Vec<String>,
    /// Module that boots the client runtime.
    pub client_entry: String,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            dev_scripts: Vec::new(),
            client_entry: "/__trellis__/client/trellis.js".to_string(),
        }
    }
}

/// Splices `data` into `template`'s head and body placeholders.
///
/// Structural errors (a layout with no slot for its child) are reported
/// before any output is produced.
pub fn assemble_page(
    template: &str,
    data: &RenderingData,
    options: &AssemblyOptions,
) -> Result<String> {
    let body = nest_fragments(data)?;
    let head = head_section(data, options)?;

    let mut document = template.to_string();
    match find_first(&HEAD_MARKER, &document) {
        Some(range) => document = splice(&document, range, &head),
        None => tracing::warn!("template has no <{HEAD_TAG}> placeholder"),
    }
    match find_first(&BODY_MARKER, &document) {
        Some(range) => {
            let body = format!("<{BODY_TAG}>{body}</{BODY_TAG}>");
            document = splice(&document, range, &body);
        }
        None => tracing::warn!("template has no <{BODY_TAG}> placeholder"),
    }
    Ok(document)
}

fn head_section(data: &RenderingData, options: &AssemblyOptions) -> Result<String> {
    let mut head = format!("<!--{HEAD_START_COMMENT}-->");
    for src in &options.dev_scripts {
        head.push_str(&format!(
            r#"<script type="module" src="{}"></script>"#,
            escape_attr(src)
        ));
    }
    head.push_str(&format!("<style>{WRAPPER_STYLE}</style>"));
    head.push_str(&format!(
        r#"<script type="module" src="{}"></script>"#,
        escape_attr(&options.client_entry)
    ));
    for fragment in data.fragments() {
        head.push_str(&format!(
            "<!--{}-->{}<!--{}-->",
            headfrag_start(&fragment.id),
            fragment.head,
            headfrag_end(&fragment.id)
        ));
    }
    head.push_str(&format!(
        "<script>window.{BOOTSTRAP_GLOBAL} = {{ renderingData: {} }};document.currentScript?.remove();</script>",
        to_script_json(data)?
    ));
    head.push_str(&format!("<!--{HEAD_END_COMMENT}-->"));
    Ok(head)
}

/// Wraps every fragment body and nests each one into its parent's slot.
fn nest_fragments(data: &RenderingData) -> Result<String> {
    let mut nested = wrap_fragment(&data.page.id, &data.page.body);
    for layout in data.layouts.iter().rev() {
        let filled = fill_slot(&layout.id, &layout.body, &nested)?;
        nested = wrap_fragment(&layout.id, &filled);
    }
    Ok(nested)
}
