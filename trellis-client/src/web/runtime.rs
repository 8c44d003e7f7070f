use super::dom::WebDom;
use super::island::{JsInstance, activate_in};
use super::platform::BrowserPlatform;
use super::{from_js_json, js_message, to_js_error, to_js_json};
use crate::error::ClientError;
use crate::navigation::{GotoOptions, NavigationOutcome, Navigator};
use crate::platform::{HistoryState, Platform};
use crate::store::{NavigatingData, PageData, Subscription};
use js_sys::{Function, Object, Promise, Reflect};
use serde_json::Value;
use std::rc::Rc;
use tracing::debug;
use trellis_protocol::markers::RELOAD_ATTR;
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::{Document, Element, HtmlAnchorElement, MouseEvent, PopStateEvent, Window};

type WebNavigator = Navigator<WebDom, BrowserPlatform>;

/// The handle island modules receive as the first argument of `activate`.
/// One instance exists per page load; clones share it.
#[wasm_bindgen]
#[derive(Clone)]
pub struct RuntimeContext {
    navigator: Rc<WebNavigator>,
}

impl RuntimeContext {
    pub(crate) fn new(navigator: Rc<WebNavigator>) -> Self {
        Self { navigator }
    }

    pub fn navigator(&self) -> &WebNavigator {
        &self.navigator
    }

    pub(crate) fn activate_islands(&self, fragment_ids: &[String]) {
        for id in fragment_ids {
            if let Some(bounds) = self.navigator.manager().bounds(id) {
                activate_in(self, id, &bounds.body);
            }
        }
    }

    async fn navigate(
        &self,
        target: &str,
        options: GotoOptions,
    ) -> Result<NavigationOutcome, ClientError> {
        let outcome = self.navigator.goto(target, options).await?;
        self.settle(&outcome);
        Ok(outcome)
    }

    fn settle(&self, outcome: &NavigationOutcome) {
        if let NavigationOutcome::Applied { created, .. } = outcome {
            self.activate_islands(created);
        }
    }

    fn spawn_goto(&self, target: String) {
        let runtime = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            // Failures are logged by the navigator.
            let _ = runtime.navigate(&target, GotoOptions::default()).await;
        });
    }

    fn spawn_restore(&self, state: Option<HistoryState>) {
        let runtime = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if let Ok(outcome) = runtime.navigator.restore(state).await {
                runtime.settle(&outcome);
            }
        });
    }
}

#[wasm_bindgen]
impl RuntimeContext {
    /// Client-side navigation. Resolves with the URL finally shown, or
    /// `undefined` when a newer navigation took over.
    pub fn goto(&self, url: String, replace: Option<bool>, state: JsValue) -> Promise {
        let runtime = self.clone();
        let options = GotoOptions {
            replace: replace.unwrap_or(false),
            state: from_js_json::<Value>(&state).unwrap_or_else(|| GotoOptions::default().state),
        };
        future_to_promise(async move {
            match runtime.navigate(&url, options).await.map_err(to_js_error)? {
                NavigationOutcome::Applied { url, .. } | NavigationOutcome::External(url) => {
                    Ok(JsValue::from_str(url.as_str()))
                }
                NavigationOutcome::Superseded => Ok(JsValue::UNDEFINED),
            }
        })
    }

    /// Ties an instance to `fragmentId` so it is unmounted with it.
    #[wasm_bindgen(js_name = registerInstance)]
    pub fn register_instance(&self, fragment_id: &str, instance: JsValue) {
        self.navigator.manager().register_component_instance(
            fragment_id,
            Box::new(JsInstance(instance)),
        );
    }

    /// Calls `callback` with `null` or `{ from, to }`.
    #[wasm_bindgen(js_name = subscribeNavigating)]
    pub fn subscribe_navigating(&self, callback: Function) -> StoreSubscription {
        let subscription = self.navigator.navigating().subscribe(move |navigating| {
            let value = match navigating {
                Some(navigating) => navigating_to_js(navigating),
                None => JsValue::NULL,
            };
            if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                debug!("navigating subscriber threw: {}", js_message(&e));
            }
        });
        StoreSubscription {
            subscription: Some(subscription),
        }
    }

    /// Calls `callback` with `{ url, state }`.
    #[wasm_bindgen(js_name = subscribePage)]
    pub fn subscribe_page(&self, callback: Function) -> StoreSubscription {
        let subscription = self.navigator.page().subscribe(move |page| {
            if let Err(e) = callback.call1(&JsValue::NULL, &page_to_js(page)) {
                debug!("page subscriber threw: {}", js_message(&e));
            }
        });
        StoreSubscription {
            subscription: Some(subscription),
        }
    }
}

#[wasm_bindgen]
pub struct StoreSubscription {
    subscription: Option<Subscription>,
}

#[wasm_bindgen]
impl StoreSubscription {
    pub fn unsubscribe(&mut self) {
        self.subscription.take();
    }
}

fn navigating_to_js(navigating: &NavigatingData) -> JsValue {
    let object = Object::new();
    let _ = Reflect::set(&object, &"from".into(), &navigating.from.as_str().into());
    let _ = Reflect::set(&object, &"to".into(), &navigating.to.as_str().into());
    object.into()
}

fn page_to_js(page: &PageData) -> JsValue {
    let object = Object::new();
    let state = to_js_json(&page.state).unwrap_or(JsValue::NULL);
    let _ = Reflect::set(&object, &"url".into(), &page.url.as_str().into());
    let _ = Reflect::set(&object, &"state".into(), &state);
    object.into()
}

/// Routes same-origin anchor clicks through the navigator.
pub(crate) fn intercept_links(document: &Document, runtime: &RuntimeContext) -> Result<(), ClientError> {
    let runtime = runtime.clone();
    let listener = Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
        if event.default_prevented()
            || event.button() != 0
            || event.meta_key()
            || event.ctrl_key()
            || event.shift_key()
            || event.alt_key()
        {
            return;
        }
        let Some(anchor) = event
            .target()
            .and_then(|target| target.dyn_into::<Element>().ok())
            .and_then(|element| element.closest("a").ok().flatten())
            .and_then(|element| element.dyn_into::<HtmlAnchorElement>().ok())
        else {
            return;
        };
        if !handles(&anchor, &runtime.navigator.platform().location()) {
            return;
        }
        event.prevent_default();
        runtime.spawn_goto(anchor.href());
    })
    .into_js_value();
    document.add_event_listener_with_callback("click", listener.unchecked_ref())?;
    Ok(())
}

fn handles(anchor: &HtmlAnchorElement, current: &Url) -> bool {
    let target = anchor.target();
    if !target.is_empty() && target != "_self" {
        return false;
    }
    if anchor.has_attribute(RELOAD_ATTR) || anchor.has_attribute("download") {
        return false;
    }
    let Ok(href) = Url::parse(&anchor.href()) else {
        return false;
    };
    if href.origin() != current.origin() {
        return false;
    }
    // In-page jumps stay with the browser.
    !(href.fragment().is_some() && href.path() == current.path() && href.query() == current.query())
}

/// Restores pages on back/forward.
pub(crate) fn listen_popstate(window: &Window, runtime: &RuntimeContext) -> Result<(), ClientError> {
    let runtime = runtime.clone();
    let listener = Closure::<dyn FnMut(PopStateEvent)>::new(move |event: PopStateEvent| {
        let state = from_js_json::<HistoryState>(&event.state());
        runtime.spawn_restore(state);
    })
    .into_js_value();
    window.add_event_listener_with_callback("popstate", listener.unchecked_ref())?;
    Ok(())
}
