//! The slice of the document the fragment manager and the navigation
//! controller touch. The browser implementation lives in `web::dom`; tests
//! drive an in-memory tree.

use crate::error::Result;
use trellis_protocol::FragmentRenderResult;

/// Detached DOM built for one fragment, ready to be attached.
#[derive(Debug, Clone)]
pub struct BuiltFragment<N> {
    /// Container holding `head_start`, the parsed head markup and
    /// `head_end`. Inserting it moves its children.
    pub head: N,
    pub head_start: N,
    pub head_end: N,
    /// The `<trellis-frag data-frag-id>` wrapper around the parsed body.
    pub body: N,
    /// First `<trellis-slot>` inside `body`.
    pub slot: Option<N>,
    /// Inline scripts from head and body, in document order. Parsing leaves
    /// them inert.
    pub scripts: Vec<N>,
}

pub trait FragmentDom {
    type Node: Clone + PartialEq;

    /// Direct children of the document head, in order.
    fn head_children(&self) -> Vec<Self::Node>;

    /// Text of `node` if it is a comment.
    fn comment_text(&self, node: &Self::Node) -> Option<String>;

    /// The `<trellis-frag>` wrapper carrying `id`, anywhere in the document.
    fn fragment_body(&self, id: &str) -> Option<Self::Node>;

    /// The `<trellis-body>` container.
    fn body_root(&self) -> Option<Self::Node>;

    fn build_fragment(&self, fragment: &FragmentRenderResult) -> Result<BuiltFragment<Self::Node>>;

    /// A fresh, detached `<trellis-slot>`.
    fn create_slot(&self) -> Result<Self::Node>;

    /// First `<trellis-slot>` below `within`.
    fn find_slot(&self, within: &Self::Node) -> Option<Self::Node>;

    fn replace_with(&self, old: &Self::Node, new: &Self::Node) -> Result<()>;

    /// Inserts `node` as the previous sibling of `reference`.
    fn insert_before(&self, reference: &Self::Node, node: &Self::Node) -> Result<()>;

    fn append_child(&self, parent: &Self::Node, child: &Self::Node) -> Result<()>;

    fn append_to_head(&self, node: &Self::Node) -> Result<()>;

    /// Detaches `node`. Detached nodes are left alone.
    fn remove(&self, node: &Self::Node);

    /// Detaches `start`, `end` and every sibling between them.
    fn remove_range(&self, start: &Self::Node, end: &Self::Node);

    /// Swaps an inert script for a fresh copy so the browser runs it.
    fn reactivate_script(&self, script: &Self::Node) -> Result<()>;
}
