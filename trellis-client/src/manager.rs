//! The ledger of fragments currently in the document.

use crate::dom::FragmentDom;
use crate::error::{ClientError, Result};
use crate::island::ComponentInstance;
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, warn};
use trellis_protocol::FragmentRenderResult;
use trellis_protocol::markers::{HeadMarker, parse_head_marker};

/// Where one fragment lives: its head comment pair and body wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentBounds<N> {
    pub head_start: N,
    pub head_end: N,
    pub body: N,
}

/// Detached DOM for a run of fragments, outermost first.
pub struct CreatedFragments<N> {
    /// Head containers, one per fragment.
    pub heads: Vec<N>,
    /// Wrapper of the first fragment. The rest already sit in its slots.
    pub body_root: Option<N>,
    pub fragments: Vec<(String, FragmentBounds<N>)>,
    pub scripts: Vec<N>,
}

impl<N> CreatedFragments<N> {
    pub fn ids(&self) -> Vec<String> {
        self.fragments.iter().map(|(id, _)| id.clone()).collect()
    }
}

pub struct FragmentManager<D: FragmentDom> {
    dom: D,
    head: Option<(D::Node, D::Node)>,
    body: Option<D::Node>,
    ids: RefCell<Vec<String>>,
    bounds: RefCell<HashMap<String, FragmentBounds<D::Node>>>,
    instances: RefCell<HashMap<String, Vec<Box<dyn ComponentInstance>>>>,
}

impl<D: FragmentDom> FragmentManager<D> {
    /// Rebuilds the ledger from the markers the server left in the head.
    pub fn find_frags(dom: D) -> Self {
        let mut head_start = None;
        let mut head_end = None;
        let mut open: Option<(String, D::Node)> = None;
        let mut ids = Vec::new();
        let mut bounds = HashMap::new();

        for node in dom.head_children() {
            let Some(text) = dom.comment_text(&node) else {
                continue;
            };
            match parse_head_marker(&text) {
                Some(HeadMarker::SectionStart) => head_start = Some(node),
                Some(HeadMarker::SectionEnd) => head_end = Some(node),
                Some(HeadMarker::FragmentStart(id)) => open = Some((id.to_string(), node)),
                Some(HeadMarker::FragmentEnd(id)) => {
                    let Some((open_id, start)) = open.take() else {
                        warn!(fragment = %id, "head fragment end without a start");
                        continue;
                    };
                    if open_id != id {
                        warn!(start = %open_id, end = %id, "mismatched head fragment markers");
                        continue;
                    }
                    let Some(body) = dom.fragment_body(id) else {
                        warn!(fragment = %id, "head fragment without a body wrapper");
                        continue;
                    };
                    bounds.insert(
                        open_id.clone(),
                        FragmentBounds {
                            head_start: start,
                            head_end: node,
                            body,
                        },
                    );
                    ids.push(open_id);
                }
                None => {}
            }
        }

        let head = head_start.zip(head_end);
        if head.is_none() {
            warn!("document head has no trellis section markers");
        }
        let body = dom.body_root();
        if body.is_none() {
            warn!("document has no <trellis-body>");
        }
        debug!(fragments = ?ids, "found fragments");

        Self {
            dom,
            head,
            body,
            ids: RefCell::new(ids),
            bounds: RefCell::new(bounds),
            instances: RefCell::new(HashMap::new()),
        }
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    /// Current fragment ids, outermost first.
    pub fn fragment_ids(&self) -> Vec<String> {
        self.ids.borrow().clone()
    }

    pub fn bounds(&self, id: &str) -> Option<FragmentBounds<D::Node>> {
        self.bounds.borrow().get(id).cloned()
    }

    /// The closing head section marker new head ranges go before.
    pub fn head_end(&self) -> Option<&D::Node> {
        self.head.as_ref().map(|(_, end)| end)
    }

    pub fn body_root(&self) -> Option<&D::Node> {
        self.body.as_ref()
    }

    pub fn register_component_instance(&self, id: &str, instance: Box<dyn ComponentInstance>) {
        self.instances
            .borrow_mut()
            .entry(id.to_string())
            .or_default()
            .push(instance);
    }

    pub fn instance_count(&self, id: &str) -> usize {
        self.instances.borrow().get(id).map_or(0, Vec::len)
    }

    /// Builds detached DOM for `elements`, nesting each body wrapper into
    /// the previous one's slot. Nothing is attached to the document and the
    /// ledger is unchanged until [`FragmentManager::commit`].
    pub fn create_frag(
        &self,
        elements: &[FragmentRenderResult],
    ) -> Result<CreatedFragments<D::Node>> {
        let mut created = CreatedFragments {
            heads: Vec::with_capacity(elements.len()),
            body_root: None,
            fragments: Vec::with_capacity(elements.len()),
            scripts: Vec::new(),
        };
        let mut parent: Option<(&str, Option<D::Node>)> = None;

        for element in elements {
            let built = self.dom.build_fragment(element)?;
            match &parent {
                None => created.body_root = Some(built.body.clone()),
                Some((_, Some(slot))) => self.dom.replace_with(slot, &built.body)?,
                Some((parent_id, None)) => {
                    return Err(ClientError::MissingSlot {
                        fragment_id: parent_id.to_string(),
                    });
                }
            }
            parent = Some((element.id.as_str(), built.slot));
            created.heads.push(built.head);
            created.scripts.extend(built.scripts);
            created.fragments.push((
                element.id.clone(),
                FragmentBounds {
                    head_start: built.head_start,
                    head_end: built.head_end,
                    body: built.body,
                },
            ));
            debug!(fragment = %element.id, "created fragment");
        }
        Ok(created)
    }

    /// Appends attached fragments to the ledger.
    pub fn commit(&self, fragments: Vec<(String, FragmentBounds<D::Node>)>) {
        let mut ids = self.ids.borrow_mut();
        let mut bounds = self.bounds.borrow_mut();
        for (id, fragment) in fragments {
            ids.push(id.clone());
            bounds.insert(id, fragment);
        }
    }

    /// Unmounts the fragment's instances, then removes its head range and
    /// body wrapper. Unknown ids are ignored.
    pub async fn destroy_frag(&self, id: &str) {
        self.destroy_component_instances(id).await;
        let Some(bounds) = self.bounds.borrow_mut().remove(id) else {
            return;
        };
        self.dom.remove_range(&bounds.head_start, &bounds.head_end);
        self.dom.remove(&bounds.body);
        self.ids.borrow_mut().retain(|known| known != id);
        debug!(fragment = %id, "destroyed fragment");
    }

    /// Awaits every instance's unmount, in registration order.
    pub async fn destroy_component_instances(&self, id: &str) {
        let Some(instances) = self.instances.borrow_mut().remove(id) else {
            return;
        };
        for instance in &instances {
            instance.unmount().await;
        }
    }
}
