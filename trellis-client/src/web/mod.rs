//! Browser bindings. Compiled for `wasm32` only.

mod dom;
mod island;
mod platform;
mod runtime;

pub use dom::WebDom;
pub use platform::BrowserPlatform;
pub use runtime::{RuntimeContext, StoreSubscription};

use crate::error::ClientError;
use crate::manager::FragmentManager;
use crate::navigation::Navigator;
use js_sys::{JSON, Object, Reflect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::rc::Rc;
use tracing::{error, info};
use trellis_protocol::RenderingData;
use trellis_protocol::markers::BOOTSTRAP_GLOBAL;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Window};

impl From<JsValue> for ClientError {
    fn from(value: JsValue) -> Self {
        ClientError::Dom(js_message(&value))
    }
}

pub(crate) fn js_message(value: &JsValue) -> String {
    if let Some(message) = value.as_string() {
        return message;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{value:?}")
}

pub(crate) fn to_js_error(error: ClientError) -> JsValue {
    JsValue::from_str(&error.to_string())
}

pub(crate) fn to_js_json<T: Serialize>(value: &T) -> Result<JsValue, ClientError> {
    Ok(JSON::parse(&serde_json::to_string(value)?)?)
}

pub(crate) fn from_js_json<T: DeserializeOwned>(value: &JsValue) -> Option<T> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    let json = String::from(JSON::stringify(value).ok()?);
    serde_json::from_str(&json).ok()
}

/// Runs when the module loads. Boots right away unless the document is
/// still parsing.
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    tracing_wasm::set_as_global_default();
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    if document.ready_state() == "loading" {
        let ready = {
            let document = document.clone();
            Closure::once_into_js(move || {
                if let Err(e) = boot(window, document) {
                    error!("trellis failed to start: {e}");
                }
            })
        };
        document.add_event_listener_with_callback("DOMContentLoaded", ready.unchecked_ref())?;
        return Ok(());
    }
    boot(window, document).map_err(to_js_error)
}

fn boot(window: Window, document: Document) -> Result<(), ClientError> {
    let snapshot = take_snapshot(&window)?;
    let manager = FragmentManager::find_frags(WebDom::new(document.clone()));
    let navigator = Navigator::bootstrap(manager, BrowserPlatform::new(window.clone()), snapshot)?;
    let runtime = RuntimeContext::new(Rc::new(navigator));

    let fragments = runtime.navigator().manager().fragment_ids();
    runtime.activate_islands(&fragments);
    runtime::intercept_links(&document, &runtime)?;
    runtime::listen_popstate(&window, &runtime)?;
    info!(fragments = ?fragments, "trellis client ready");
    Ok(())
}

/// Reads and forgets the rendering data the server's bootstrap script left
/// on `window`.
fn take_snapshot(window: &Window) -> Result<RenderingData, ClientError> {
    let key = JsValue::from_str(BOOTSTRAP_GLOBAL);
    let holder = Reflect::get(window, &key)?;
    let data = Reflect::get(&holder, &JsValue::from_str("renderingData"))?;
    Reflect::delete_property(window.unchecked_ref::<Object>(), &key)?;
    from_js_json(&data).ok_or_else(|| {
        ClientError::Dom(format!("window.{BOOTSTRAP_GLOBAL} holds no rendering data"))
    })
}
