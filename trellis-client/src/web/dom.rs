use crate::dom::{BuiltFragment, FragmentDom};
use crate::error::{ClientError, Result};
use trellis_protocol::FragmentRenderResult;
use trellis_protocol::markers::{
    BODY_TAG, FRAG_ID_ATTR, FRAG_TAG, SLOT_TAG, headfrag_end, headfrag_start,
};
use wasm_bindgen::JsCast;
use web_sys::{Document, DocumentFragment, Element, HtmlTemplateElement, Node, NodeList};

/// [`FragmentDom`] over the live document.
#[derive(Clone)]
pub struct WebDom {
    document: Document,
}

impl WebDom {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    /// Parses `markup` without running anything in it.
    fn parse(&self, markup: &str) -> Result<DocumentFragment> {
        let template: HtmlTemplateElement = self
            .document
            .create_element("template")?
            .dyn_into()
            .map_err(|_| ClientError::Dom("<template> is not a template element".into()))?;
        template.set_inner_html(markup);
        Ok(template.content())
    }
}

fn nodes(list: NodeList) -> impl Iterator<Item = Node> {
    (0..list.length()).filter_map(move |i| list.item(i))
}

fn parent(node: &Node) -> Result<Node> {
    node.parent_node()
        .ok_or_else(|| ClientError::Dom("node is not attached".into()))
}

impl FragmentDom for WebDom {
    type Node = Node;

    fn head_children(&self) -> Vec<Node> {
        match self.document.head() {
            Some(head) => nodes(head.child_nodes()).collect(),
            None => Vec::new(),
        }
    }

    fn comment_text(&self, node: &Node) -> Option<String> {
        if node.node_type() != Node::COMMENT_NODE {
            return None;
        }
        node.text_content()
    }

    fn fragment_body(&self, id: &str) -> Option<Node> {
        self.document
            .query_selector(&format!("{FRAG_TAG}[{FRAG_ID_ATTR}=\"{id}\"]"))
            .ok()
            .flatten()
            .map(Node::from)
    }

    fn body_root(&self) -> Option<Node> {
        self.document
            .query_selector(BODY_TAG)
            .ok()
            .flatten()
            .map(Node::from)
    }

    fn build_fragment(&self, fragment: &FragmentRenderResult) -> Result<BuiltFragment<Node>> {
        let head = self.document.create_document_fragment();
        let head_start: Node = self.document.create_comment(&headfrag_start(&fragment.id)).into();
        let head_end: Node = self.document.create_comment(&headfrag_end(&fragment.id)).into();
        head.append_child(&head_start)?;
        head.append_child(&self.parse(&fragment.head)?)?;
        head.append_child(&head_end)?;

        let body = self.document.create_element(FRAG_TAG)?;
        body.set_attribute(FRAG_ID_ATTR, &fragment.id)?;
        body.append_child(&self.parse(&fragment.body)?)?;
        let slot = body.query_selector(SLOT_TAG)?.map(Node::from);

        let mut scripts: Vec<Node> = nodes(head.query_selector_all("script")?).collect();
        scripts.extend(nodes(body.query_selector_all("script")?));

        Ok(BuiltFragment {
            head: head.into(),
            head_start,
            head_end,
            body: body.into(),
            slot,
            scripts,
        })
    }

    fn create_slot(&self) -> Result<Node> {
        Ok(self.document.create_element(SLOT_TAG)?.into())
    }

    fn find_slot(&self, within: &Node) -> Option<Node> {
        within
            .dyn_ref::<Element>()?
            .query_selector(SLOT_TAG)
            .ok()
            .flatten()
            .map(Node::from)
    }

    fn replace_with(&self, old: &Node, new: &Node) -> Result<()> {
        parent(old)?.replace_child(new, old)?;
        Ok(())
    }

    fn insert_before(&self, reference: &Node, node: &Node) -> Result<()> {
        parent(reference)?.insert_before(node, Some(reference))?;
        Ok(())
    }

    fn append_child(&self, parent: &Node, child: &Node) -> Result<()> {
        parent.append_child(child)?;
        Ok(())
    }

    fn append_to_head(&self, node: &Node) -> Result<()> {
        let head = self
            .document
            .head()
            .ok_or_else(|| ClientError::Dom("document has no <head>".into()))?;
        head.append_child(node)?;
        Ok(())
    }

    fn remove(&self, node: &Node) {
        if let Some(parent) = node.parent_node() {
            let _ = parent.remove_child(node);
        }
    }

    fn remove_range(&self, start: &Node, end: &Node) {
        let Some(parent) = start.parent_node() else {
            return;
        };
        let mut current = Some(start.clone());
        while let Some(node) = current {
            let next = node.next_sibling();
            let last = node.is_same_node(Some(end));
            let _ = parent.remove_child(&node);
            if last {
                break;
            }
            current = next;
        }
    }

    fn reactivate_script(&self, script: &Node) -> Result<()> {
        let inert = script
            .dyn_ref::<Element>()
            .ok_or_else(|| ClientError::Dom("script node is not an element".into()))?;
        let fresh = self.document.create_element("script")?;
        let attributes = inert.attributes();
        for i in 0..attributes.length() {
            if let Some(attribute) = attributes.item(i) {
                fresh.set_attribute(&attribute.name(), &attribute.value())?;
            }
        }
        fresh.set_text_content(inert.text_content().as_deref());
        parent(script)?.replace_child(&fresh, script)?;
        Ok(())
    }
}
