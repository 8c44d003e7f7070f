//! Client-side navigation: fetch the target's fragment stack, keep the
//! shared prefix, swap the rest.

use crate::dom::FragmentDom;
use crate::error::{ClientError, Result};
use crate::manager::FragmentManager;
use crate::platform::{HistoryState, Platform};
use crate::store::{NavigatingData, PageData, Store};
use futures::lock::Mutex;
use serde_json::{Map, Value};
use std::cell::Cell;
use tracing::{debug, error, info, warn};
use trellis_protocol::markers::{NAVIGATION_PATH, NAVIGATION_QUERY};
use trellis_protocol::{
    FragmentRenderResult, NavigationPayload, NavigationResponse, RenderingData, common_prefix_len,
};
use url::Url;

/// Redirect payloads followed by one navigation before giving up.
pub const MAX_REDIRECTS: usize = 8;

#[derive(Debug, Clone)]
pub struct GotoOptions {
    /// Replace the current history entry instead of pushing one.
    pub replace: bool,
    /// Stored with the history entry and published as [`PageData::state`].
    pub state: Value,
}

impl Default for GotoOptions {
    fn default() -> Self {
        Self {
            replace: false,
            state: empty_state(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    /// The document shows `url`. `created` lists the new fragment ids,
    /// outermost first.
    Applied { url: Url, created: Vec<String> },
    /// Handed to the browser as a full page load.
    External(Url),
    /// A newer navigation started first. Nothing was touched.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryUpdate {
    Push,
    Replace,
    Keep,
}

enum Resolved {
    Page(Url, RenderingData),
    External(Url),
}

pub struct Navigator<D: FragmentDom, P: Platform> {
    manager: FragmentManager<D>,
    platform: P,
    generation: Cell<u64>,
    apply_lock: Mutex<()>,
    navigating: Store<Option<NavigatingData>>,
    page: Store<PageData>,
}

impl<D: FragmentDom, P: Platform> Navigator<D, P> {
    /// Takes over a server-rendered document. `snapshot` is the stack the
    /// server embedded; it is written into the current history entry so
    /// coming back here needs no fetch.
    pub fn bootstrap(
        manager: FragmentManager<D>,
        platform: P,
        snapshot: RenderingData,
    ) -> Result<Self> {
        let url = platform.location();
        let state = HistoryState {
            rendering_data: snapshot,
            page_state: empty_state(),
        };
        platform.replace_state(&state, &url)?;
        Ok(Self {
            manager,
            platform,
            generation: Cell::new(0),
            apply_lock: Mutex::new(()),
            navigating: Store::new(None),
            page: Store::new(PageData {
                url,
                state: state.page_state,
            }),
        })
    }

    pub fn manager(&self) -> &FragmentManager<D> {
        &self.manager
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// `Some` while a navigation is in flight.
    pub fn navigating(&self) -> &Store<Option<NavigatingData>> {
        &self.navigating
    }

    pub fn page(&self) -> &Store<PageData> {
        &self.page
    }

    /// Navigates to `target`, resolved against the current location.
    pub async fn goto(&self, target: &str, options: GotoOptions) -> Result<NavigationOutcome> {
        let from = self.platform.location();
        let to = from.join(target)?;
        if to.origin() != from.origin() {
            self.platform.assign(&to);
            return Ok(NavigationOutcome::External(to));
        }
        let generation = self.begin(from, to.clone());
        let history = if options.replace {
            HistoryUpdate::Replace
        } else {
            HistoryUpdate::Push
        };
        self.navigate(generation, to, history, options.state).await
    }

    /// Handles a back/forward move to the current location. `state` is the
    /// entry's [`HistoryState`]; without one the stack is fetched and
    /// written back into the entry.
    pub async fn restore(&self, state: Option<HistoryState>) -> Result<NavigationOutcome> {
        let to = self.platform.location();
        let from = self.page.get().url;
        let generation = self.begin(from, to.clone());
        match state {
            Some(state) => {
                self.apply(
                    generation,
                    to,
                    state.rendering_data,
                    HistoryUpdate::Keep,
                    state.page_state,
                )
                .await
            }
            None => {
                self.navigate(generation, to, HistoryUpdate::Replace, empty_state())
                    .await
            }
        }
    }

    fn begin(&self, from: Url, to: Url) -> u64 {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.navigating.set(Some(NavigatingData { from, to }));
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation
    }

    /// Clears the indicator unless a newer navigation owns it.
    fn finish(&self, generation: u64) {
        if self.is_current(generation) {
            self.navigating.set(None);
        }
    }

    async fn navigate(
        &self,
        generation: u64,
        to: Url,
        history: HistoryUpdate,
        page_state: Value,
    ) -> Result<NavigationOutcome> {
        match self.resolve(to).await {
            Ok(Resolved::Page(url, data)) => {
                self.apply(generation, url, data, history, page_state).await
            }
            Ok(Resolved::External(url)) => {
                self.finish(generation);
                self.platform.assign(&url);
                Ok(NavigationOutcome::External(url))
            }
            Err(e) => {
                self.finish(generation);
                error!("navigation failed: {e}");
                Err(e)
            }
        }
    }

    /// Fetches the stack for `target`, following redirect payloads.
    async fn resolve(&self, mut target: Url) -> Result<Resolved> {
        for _ in 0..=MAX_REDIRECTS {
            let body = self.platform.fetch(&navigation_url(&target)).await?;
            match NavigationPayload::from_slice(&body)? {
                NavigationPayload::Response(NavigationResponse::Redirect { location }) => {
                    let next = target.join(&location)?;
                    if next.origin() != target.origin() {
                        return Ok(Resolved::External(next));
                    }
                    debug!(from = %target, to = %next, "following navigation redirect");
                    target = next;
                }
                NavigationPayload::Response(NavigationResponse::Page { rendering_data })
                | NavigationPayload::Bare(rendering_data) => {
                    return Ok(Resolved::Page(target, rendering_data));
                }
            }
        }
        Err(ClientError::TooManyRedirects {
            limit: MAX_REDIRECTS,
        })
    }

    async fn apply(
        &self,
        generation: u64,
        url: Url,
        data: RenderingData,
        history: HistoryUpdate,
        page_state: Value,
    ) -> Result<NavigationOutcome> {
        if !self.is_current(generation) {
            warn!(%url, "discarding stale navigation");
            return Ok(NavigationOutcome::Superseded);
        }
        let _guard = self.apply_lock.lock().await;
        if !self.is_current(generation) {
            warn!(%url, "discarding stale navigation");
            return Ok(NavigationOutcome::Superseded);
        }

        match self.patch(&url, data, history, &page_state).await {
            Ok(created) => {
                self.finish(generation);
                self.page.set(PageData {
                    url: url.clone(),
                    state: page_state,
                });
                info!(%url, created = ?created, "navigated");
                Ok(NavigationOutcome::Applied { url, created })
            }
            Err(e) => {
                self.finish(generation);
                error!(%url, "navigation failed: {e}");
                Err(e)
            }
        }
    }

    /// Swaps every fragment past the shared prefix for the incoming ones.
    async fn patch(
        &self,
        url: &Url,
        data: RenderingData,
        history: HistoryUpdate,
        page_state: &Value,
    ) -> Result<Vec<String>> {
        let dom = self.manager.dom();
        let current = self.manager.fragment_ids();
        let incoming: Vec<FragmentRenderResult> = data.fragments().cloned().collect();
        let incoming_ids: Vec<&str> = incoming.iter().map(|f| f.id.as_str()).collect();
        let keep = common_prefix_len(&incoming_ids, &current);
        debug!(keep, current = ?current, incoming = ?incoming_ids, "diffed fragment stacks");

        // Everything that can fail on the incoming markup runs before the
        // document or history is touched.
        let created = self.manager.create_frag(&incoming[keep..])?;
        let replaced = current.get(keep).and_then(|id| self.manager.bounds(id));
        let attach = match (&created.body_root, &replaced) {
            (None, _) | (Some(_), Some(_)) => Attach::Placeholder,
            (Some(_), None) if keep > 0 => {
                let parent = &current[keep - 1];
                let slot = self
                    .manager
                    .bounds(parent)
                    .and_then(|bounds| dom.find_slot(&bounds.body))
                    .ok_or_else(|| ClientError::MissingSlot {
                        fragment_id: parent.clone(),
                    })?;
                Attach::Slot(slot)
            }
            (Some(_), None) => Attach::Append(
                self.manager
                    .body_root()
                    .cloned()
                    .ok_or_else(|| ClientError::Dom("document has no <trellis-body>".into()))?,
            ),
        };

        // The first replaced wrapper makes way for a slot the new stack is
        // attached at.
        let placeholder = match replaced {
            Some(bounds) => {
                let slot = dom.create_slot()?;
                dom.replace_with(&bounds.body, &slot)?;
                Some(slot)
            }
            None => None,
        };

        let state = HistoryState {
            rendering_data: data,
            page_state: page_state.clone(),
        };
        match history {
            HistoryUpdate::Push => self.platform.push_state(&state, url)?,
            HistoryUpdate::Replace => self.platform.replace_state(&state, url)?,
            HistoryUpdate::Keep => {}
        }

        for id in current[keep..].iter().rev() {
            self.manager.destroy_frag(id).await;
        }

        if let Some(root) = &created.body_root {
            match (attach, placeholder) {
                (Attach::Placeholder, Some(slot)) | (Attach::Slot(slot), _) => {
                    dom.replace_with(&slot, root)?
                }
                (Attach::Append(container), _) => dom.append_child(&container, root)?,
                (Attach::Placeholder, None) => {}
            }
        }
        for head in &created.heads {
            match self.manager.head_end() {
                Some(end) => dom.insert_before(end, head)?,
                None => dom.append_to_head(head)?,
            }
        }
        for script in &created.scripts {
            dom.reactivate_script(script)?;
        }

        let ids = created.ids();
        self.manager.commit(created.fragments);
        Ok(ids)
    }
}

/// Where the root of a newly built suffix goes.
enum Attach<N> {
    /// The slot left behind by the first replaced fragment.
    Placeholder,
    /// The slot of the last kept fragment.
    Slot(N),
    /// The end of `<trellis-body>`.
    Append(N),
}

/// The navigation endpoint URL asking for `target`'s stack.
pub fn navigation_url(target: &Url) -> Url {
    let to = match target.query() {
        Some(query) => format!("{}?{query}", target.path()),
        None => target.path().to_string(),
    };
    let mut url = target.clone();
    url.set_path(NAVIGATION_PATH);
    url.set_fragment(None);
    url.query_pairs_mut().clear().append_pair(NAVIGATION_QUERY, &to);
    url
}

fn empty_state() -> Value {
    Value::Object(Map::new())
}
