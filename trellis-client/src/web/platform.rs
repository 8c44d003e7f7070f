use super::{js_message, to_js_json};
use crate::error::{ClientError, Result};
use crate::platform::{HistoryState, Platform};
use futures::future::LocalBoxFuture;
use js_sys::Uint8Array;
use tracing::warn;
use url::Url;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Response, Window};

pub struct BrowserPlatform {
    window: Window,
}

impl BrowserPlatform {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl Platform for BrowserPlatform {
    fn location(&self) -> Url {
        self.window
            .location()
            .href()
            .ok()
            .and_then(|href| Url::parse(&href).ok())
            .unwrap_or_else(|| Url::parse("about:blank").expect("valid fallback url"))
    }

    fn fetch(&self, url: &Url) -> LocalBoxFuture<'_, Result<Vec<u8>>> {
        let pending = self.window.fetch_with_str(url.as_str());
        Box::pin(async move {
            let response: Response = JsFuture::from(pending)
                .await
                .map_err(|e| ClientError::Fetch(js_message(&e)))?
                .dyn_into()
                .map_err(|_| ClientError::Fetch("fetch resolved to a non-response".into()))?;
            let body = response
                .array_buffer()
                .map_err(|e| ClientError::Fetch(js_message(&e)))?;
            let body = JsFuture::from(body)
                .await
                .map_err(|e| ClientError::Fetch(js_message(&e)))?;
            Ok(Uint8Array::new(&body).to_vec())
        })
    }

    fn push_state(&self, state: &HistoryState, url: &Url) -> Result<()> {
        let state = to_js_json(state)?;
        self.window
            .history()?
            .push_state_with_url(&state, "", Some(url.as_str()))?;
        Ok(())
    }

    fn replace_state(&self, state: &HistoryState, url: &Url) -> Result<()> {
        let state = to_js_json(state)?;
        self.window
            .history()?
            .replace_state_with_url(&state, "", Some(url.as_str()))?;
        Ok(())
    }

    fn assign(&self, url: &Url) {
        if let Err(e) = self.window.location().assign(url.as_str()) {
            warn!(%url, "full page navigation failed: {}", js_message(&e));
        }
    }
}
