#![allow(dead_code)]

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use trellis_client::protocol::markers::{
    FRAG_ID_ATTR, FRAG_TAG, HEAD_END_COMMENT, HEAD_START_COMMENT, HeadMarker, SLOT_TAG,
    headfrag_end, headfrag_start, parse_head_marker,
};
use trellis_client::protocol::{FragmentRenderResult, NavigationResponse, RenderingData};
use trellis_client::{
    BuiltFragment, ClientError, ComponentInstance, FragmentDom, HistoryState, Platform, Result,
};
use url::Url;

pub type Log = Rc<RefCell<Vec<String>>>;

const SLOT_HTML: &str = "<trellis-slot></trellis-slot>";

#[derive(Debug, Clone)]
enum Kind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Comment(String),
    Text(String),
    Fragment,
}

#[derive(Debug)]
struct NodeData {
    kind: Kind,
    parent: Option<usize>,
    children: Vec<usize>,
}

struct Tree {
    nodes: Vec<NodeData>,
    root: usize,
    head: usize,
}

impl Tree {
    fn create(&mut self, kind: Kind) -> usize {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> usize {
        self.create(Kind::Element {
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    fn tag(&self, node: usize) -> Option<&str> {
        match &self.nodes[node].kind {
            Kind::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    fn attr(&self, node: usize, name: &str) -> Option<&str> {
        match &self.nodes[node].kind {
            Kind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    fn detach(&mut self, node: usize) {
        if let Some(parent) = self.nodes[node].parent.take() {
            self.nodes[parent].children.retain(|&child| child != node);
        }
    }

    /// Children to move when `node` is inserted: a fragment moves its own.
    fn take_insertable(&mut self, node: usize) -> Vec<usize> {
        match self.nodes[node].kind {
            Kind::Fragment => {
                let children = std::mem::take(&mut self.nodes[node].children);
                for &child in &children {
                    self.nodes[child].parent = None;
                }
                children
            }
            _ => {
                self.detach(node);
                vec![node]
            }
        }
    }

    fn insert_at(&mut self, parent: usize, index: usize, nodes: Vec<usize>) {
        for (offset, node) in nodes.into_iter().enumerate() {
            self.nodes[node].parent = Some(parent);
            self.nodes[parent].children.insert(index + offset, node);
        }
    }

    fn append(&mut self, parent: usize, node: usize) {
        let nodes = self.take_insertable(node);
        let index = self.nodes[parent].children.len();
        self.insert_at(parent, index, nodes);
    }

    fn position(&self, node: usize) -> Option<(usize, usize)> {
        let parent = self.nodes[node].parent?;
        let index = self.nodes[parent]
            .children
            .iter()
            .position(|&child| child == node)?;
        Some((parent, index))
    }

    fn descendants(&self, node: usize, out: &mut Vec<usize>) {
        for &child in &self.nodes[node].children {
            out.push(child);
            self.descendants(child, out);
        }
    }

    fn find_below(&self, node: usize, pred: impl Fn(&Tree, usize) -> bool) -> Option<usize> {
        let mut all = Vec::new();
        self.descendants(node, &mut all);
        all.into_iter().find(|&n| pred(self, n))
    }

    /// Text, slots and inline scripts. Enough markup for fragment bodies.
    fn parse(&mut self, markup: &str) -> Vec<usize> {
        let mut nodes = Vec::new();
        let mut rest = markup;
        while !rest.is_empty() {
            let slot = rest.find(SLOT_HTML).map(|i| (i, true));
            let script = rest.find("<script>").map(|i| (i, false));
            let next = [slot, script].into_iter().flatten().min_by_key(|(i, _)| *i);
            let Some((at, is_slot)) = next else {
                nodes.push(self.create(Kind::Text(rest.to_string())));
                break;
            };
            if at > 0 {
                nodes.push(self.create(Kind::Text(rest[..at].to_string())));
            }
            if is_slot {
                nodes.push(self.element(SLOT_TAG, &[]));
                rest = &rest[at + SLOT_HTML.len()..];
            } else {
                let start = at + "<script>".len();
                let end = rest[start..]
                    .find("</script>")
                    .map_or(rest.len(), |e| start + e);
                let script = self.element("script", &[]);
                let text = self.create(Kind::Text(rest[start..end].to_string()));
                self.append(script, text);
                nodes.push(script);
                rest = &rest[(end + "</script>".len()).min(rest.len())..];
            }
        }
        nodes
    }

    fn text_content(&self, node: usize) -> String {
        match &self.nodes[node].kind {
            Kind::Text(text) => text.clone(),
            Kind::Comment(_) => String::new(),
            _ => self.nodes[node]
                .children
                .iter()
                .map(|&child| self.text_content(child))
                .collect(),
        }
    }

    fn html(&self, node: usize) -> String {
        match &self.nodes[node].kind {
            Kind::Text(text) => text.clone(),
            Kind::Comment(text) => format!("<!--{text}-->"),
            Kind::Fragment => self.children_html(node),
            Kind::Element { tag, attrs } => {
                let attrs: String = attrs
                    .iter()
                    .map(|(k, v)| format!(" {k}=\"{v}\""))
                    .collect();
                format!("<{tag}{attrs}>{}</{tag}>", self.children_html(node))
            }
        }
    }

    fn children_html(&self, node: usize) -> String {
        self.nodes[node]
            .children
            .iter()
            .map(|&child| self.html(child))
            .collect()
    }
}

/// An in-memory document recording every mutation trellis makes.
#[derive(Clone)]
pub struct MemoryDom {
    tree: Rc<RefCell<Tree>>,
    pub log: Log,
}

impl MemoryDom {
    pub fn empty(log: Log) -> Self {
        let mut tree = Tree {
            nodes: Vec::new(),
            root: 0,
            head: 0,
        };
        let root = tree.element("html", &[]);
        let head = tree.element("head", &[]);
        let body = tree.element("body", &[]);
        let container = tree.element("trellis-body", &[]);
        tree.append(root, head);
        tree.append(root, body);
        tree.append(body, container);
        tree.root = root;
        tree.head = head;
        Self {
            tree: Rc::new(RefCell::new(tree)),
            log,
        }
    }

    /// The document the server sends for `data`.
    pub fn loaded(data: &RenderingData, log: Log) -> Self {
        let dom = Self::empty(log);
        {
            let mut tree = dom.tree.borrow_mut();
            let head = tree.head;
            let meta = tree.create(Kind::Text("<meta charset=\"utf-8\">".to_string()));
            tree.append(head, meta);
            let unrelated = tree.create(Kind::Comment("build 42".to_string()));
            tree.append(head, unrelated);
            let start = tree.create(Kind::Comment(HEAD_START_COMMENT.to_string()));
            tree.append(head, start);
        }
        let mut slot: Option<usize> = None;
        let mut root = None;
        for fragment in data.fragments() {
            let built = dom.build_fragment(fragment).unwrap();
            let mut tree = dom.tree.borrow_mut();
            let head = tree.head;
            tree.append(head, built.head);
            match slot {
                Some(slot) => {
                    let (parent, index) = tree.position(slot).unwrap();
                    tree.detach(slot);
                    tree.insert_at(parent, index, vec![built.body]);
                }
                None => root = Some(built.body),
            }
            slot = built.slot;
        }
        {
            let mut tree = dom.tree.borrow_mut();
            let head = tree.head;
            let end = tree.create(Kind::Comment(HEAD_END_COMMENT.to_string()));
            tree.append(head, end);
            let container = dom.find(&tree, |t, n| t.tag(n) == Some("trellis-body"));
            tree.append(container.unwrap(), root.unwrap());
        }
        dom.log.borrow_mut().clear();
        dom
    }

    fn find(&self, tree: &Tree, pred: impl Fn(&Tree, usize) -> bool) -> Option<usize> {
        tree.find_below(tree.root, pred)
    }

    fn record(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }

    pub fn body_html(&self) -> String {
        let tree = self.tree.borrow();
        let container = self
            .find(&tree, |t, n| t.tag(n) == Some("trellis-body"))
            .unwrap();
        tree.children_html(container)
    }

    pub fn head_html(&self) -> String {
        let tree = self.tree.borrow();
        tree.children_html(tree.head)
    }

    pub fn node_html(&self, node: usize) -> String {
        self.tree.borrow().html(node)
    }

    pub fn is_attached(&self, node: usize) -> bool {
        let tree = self.tree.borrow();
        let mut current = node;
        while let Some(parent) = tree.nodes[current].parent {
            current = parent;
        }
        current == tree.root
    }
}

impl FragmentDom for MemoryDom {
    type Node = usize;

    fn head_children(&self) -> Vec<usize> {
        let tree = self.tree.borrow();
        tree.nodes[tree.head].children.clone()
    }

    fn comment_text(&self, node: &usize) -> Option<String> {
        match &self.tree.borrow().nodes[*node].kind {
            Kind::Comment(text) => Some(text.clone()),
            _ => None,
        }
    }

    fn fragment_body(&self, id: &str) -> Option<usize> {
        let tree = self.tree.borrow();
        self.find(&tree, |t, n| {
            t.tag(n) == Some(FRAG_TAG) && t.attr(n, FRAG_ID_ATTR) == Some(id)
        })
    }

    fn body_root(&self) -> Option<usize> {
        let tree = self.tree.borrow();
        self.find(&tree, |t, n| t.tag(n) == Some("trellis-body"))
    }

    fn build_fragment(&self, fragment: &FragmentRenderResult) -> Result<BuiltFragment<usize>> {
        let mut tree = self.tree.borrow_mut();
        let head = tree.create(Kind::Fragment);
        let head_start = tree.create(Kind::Comment(headfrag_start(&fragment.id)));
        let head_end = tree.create(Kind::Comment(headfrag_end(&fragment.id)));
        tree.append(head, head_start);
        for node in tree.parse(&fragment.head) {
            tree.append(head, node);
        }
        tree.append(head, head_end);

        let body = tree.element(FRAG_TAG, &[(FRAG_ID_ATTR, fragment.id.as_str())]);
        for node in tree.parse(&fragment.body) {
            tree.append(body, node);
        }
        let slot = tree.find_below(body, |t, n| t.tag(n) == Some(SLOT_TAG));

        let mut scripts = Vec::new();
        for container in [head, body] {
            let mut all = Vec::new();
            tree.descendants(container, &mut all);
            scripts.extend(all.into_iter().filter(|&n| tree.tag(n) == Some("script")));
        }
        drop(tree);
        self.record(format!("build {}", fragment.id));
        Ok(BuiltFragment {
            head,
            head_start,
            head_end,
            body,
            slot,
            scripts,
        })
    }

    fn create_slot(&self) -> Result<usize> {
        Ok(self.tree.borrow_mut().element(SLOT_TAG, &[]))
    }

    fn find_slot(&self, within: &usize) -> Option<usize> {
        self.tree
            .borrow()
            .find_below(*within, |t, n| t.tag(n) == Some(SLOT_TAG))
    }

    fn replace_with(&self, old: &usize, new: &usize) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        let (parent, index) = tree
            .position(*old)
            .ok_or_else(|| ClientError::Dom("replacing a detached node".into()))?;
        let nodes = tree.take_insertable(*new);
        tree.detach(*old);
        tree.insert_at(parent, index, nodes);
        Ok(())
    }

    fn insert_before(&self, reference: &usize, node: &usize) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        let nodes = tree.take_insertable(*node);
        let (parent, index) = tree
            .position(*reference)
            .ok_or_else(|| ClientError::Dom("inserting before a detached node".into()))?;
        tree.insert_at(parent, index, nodes);
        Ok(())
    }

    fn append_child(&self, parent: &usize, child: &usize) -> Result<()> {
        self.tree.borrow_mut().append(*parent, *child);
        Ok(())
    }

    fn append_to_head(&self, node: &usize) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        let head = tree.head;
        tree.append(head, *node);
        Ok(())
    }

    fn remove(&self, node: &usize) {
        let mut tree = self.tree.borrow_mut();
        let entry = match tree.attr(*node, FRAG_ID_ATTR) {
            Some(id) => format!("remove-body {id}"),
            None => "remove".to_string(),
        };
        tree.detach(*node);
        drop(tree);
        self.record(entry);
    }

    fn remove_range(&self, start: &usize, end: &usize) {
        let mut tree = self.tree.borrow_mut();
        let Some((parent, from)) = tree.position(*start) else {
            return;
        };
        let to = tree
            .position(*end)
            .filter(|(p, index)| *p == parent && *index >= from)
            .map_or(from, |(_, index)| index);
        let doomed: Vec<usize> = tree.nodes[parent].children[from..=to].to_vec();
        for node in doomed {
            tree.detach(node);
        }
        let label = match &tree.nodes[*start].kind {
            Kind::Comment(text) => match parse_head_marker(text) {
                Some(HeadMarker::FragmentStart(id)) => id.to_string(),
                _ => text.clone(),
            },
            _ => String::new(),
        };
        drop(tree);
        self.record(format!("remove-head {label}"));
    }

    fn reactivate_script(&self, script: &usize) -> Result<()> {
        let text = {
            let mut tree = self.tree.borrow_mut();
            let text = tree.text_content(*script);
            let fresh = tree.element("script", &[("data-live", "")]);
            let content = tree.create(Kind::Text(text.clone()));
            tree.append(fresh, content);
            let (parent, index) = tree
                .position(*script)
                .ok_or_else(|| ClientError::Dom("script is not attached".into()))?;
            tree.detach(*script);
            tree.insert_at(parent, index, vec![fresh]);
            text
        };
        self.record(format!("run {text}"));
        Ok(())
    }
}

#[derive(Default)]
struct PlatformState {
    location: RefCell<Option<Url>>,
    routes: RefCell<HashMap<String, Vec<u8>>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    history: RefCell<Vec<(Url, HistoryState)>>,
    assigned: RefCell<Vec<Url>>,
    fetches: RefCell<Vec<String>>,
}

/// Location, history and a canned navigation endpoint.
#[derive(Clone)]
pub struct MemoryPlatform {
    state: Rc<PlatformState>,
    log: Log,
}

impl MemoryPlatform {
    pub fn new(location: &str, log: Log) -> Self {
        let platform = Self {
            state: Rc::default(),
            log,
        };
        *platform.state.location.borrow_mut() = Some(Url::parse(location).unwrap());
        platform
    }

    /// Serves `data` for navigations to `path`.
    pub fn page(&self, path: &str, data: &RenderingData) {
        let body = serde_json::to_vec(&NavigationResponse::Page {
            rendering_data: data.clone(),
        })
        .unwrap();
        self.state.routes.borrow_mut().insert(path.to_string(), body);
    }

    pub fn redirect(&self, path: &str, location: &str) {
        let body = serde_json::to_vec(&NavigationResponse::Redirect {
            location: location.to_string(),
        })
        .unwrap();
        self.state.routes.borrow_mut().insert(path.to_string(), body);
    }

    pub fn raw(&self, path: &str, body: &[u8]) {
        self.state
            .routes
            .borrow_mut()
            .insert(path.to_string(), body.to_vec());
    }

    /// Holds fetches of `path` until the returned sender fires.
    pub fn gate(&self, path: &str) -> oneshot::Sender<()> {
        let (open, gate) = oneshot::channel();
        self.state.gates.borrow_mut().insert(path.to_string(), gate);
        open
    }

    /// Moves the location the way the browser does before `popstate`.
    pub fn travel(&self, location: &str) {
        *self.state.location.borrow_mut() = Some(Url::parse(location).unwrap());
    }

    pub fn history(&self) -> Vec<(String, HistoryState)> {
        self.state
            .history
            .borrow()
            .iter()
            .map(|(url, state)| (url.path().to_string(), state.clone()))
            .collect()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.state.fetches.borrow().clone()
    }

    pub fn assigned(&self) -> Vec<Url> {
        self.state.assigned.borrow().clone()
    }
}

impl Platform for MemoryPlatform {
    fn location(&self) -> Url {
        self.state
            .location
            .borrow()
            .clone()
            .unwrap_or_else(|| Url::parse("http://site.test/").unwrap())
    }

    fn fetch(&self, url: &Url) -> LocalBoxFuture<'_, Result<Vec<u8>>> {
        let to = url
            .query_pairs()
            .find(|(key, _)| key == "to")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        Box::pin(async move {
            self.state.fetches.borrow_mut().push(to.clone());
            let gate = self.state.gates.borrow_mut().remove(&to);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.state
                .routes
                .borrow()
                .get(&to)
                .cloned()
                .ok_or_else(|| ClientError::Fetch(format!("no route for {to}")))
        })
    }

    fn push_state(&self, state: &HistoryState, url: &Url) -> Result<()> {
        self.log.borrow_mut().push(format!("push {}", url.path()));
        self.state
            .history
            .borrow_mut()
            .push((url.clone(), state.clone()));
        *self.state.location.borrow_mut() = Some(url.clone());
        Ok(())
    }

    fn replace_state(&self, state: &HistoryState, url: &Url) -> Result<()> {
        self.log.borrow_mut().push(format!("replace {}", url.path()));
        let mut history = self.state.history.borrow_mut();
        history.pop();
        history.push((url.clone(), state.clone()));
        *self.state.location.borrow_mut() = Some(url.clone());
        Ok(())
    }

    fn assign(&self, url: &Url) {
        self.state.assigned.borrow_mut().push(url.clone());
    }
}

/// An island that logs its unmount after yielding once.
pub struct RecordingInstance {
    pub name: String,
    pub log: Log,
}

impl ComponentInstance for RecordingInstance {
    fn unmount(&self) -> LocalBoxFuture<'_, ()> {
        Box::pin(async move {
            YieldNow(false).await;
            self.log.borrow_mut().push(format!("unmount {}", self.name));
        })
    }
}

struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn frag(id: &str, body: &str) -> FragmentRenderResult {
    FragmentRenderResult {
        id: id.to_string(),
        head: format!("<title>{id}</title>"),
        body: body.to_string(),
    }
}

pub fn layout(id: &str) -> FragmentRenderResult {
    frag(id, &format!("<nav>{id}</nav>{SLOT_HTML}"))
}

pub fn stack(layouts: &[&str], page: &str) -> RenderingData {
    RenderingData {
        layouts: layouts.iter().map(|id| layout(id)).collect(),
        page: frag(page, &format!("<p>{page}</p>")),
    }
}
