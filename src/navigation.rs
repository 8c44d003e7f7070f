//! `GET /__trellis__/navigation?to=<path>`: the fragment stack of another
//! route as JSON, for client-side navigation.

use crate::app::App;
use crate::error::{Error, Result};
use crate::render::random_page_id;
use crate::request::RequestEvent;
use crate::router::normalize_path;
use bytes::Bytes;
use hyper::StatusCode;
use hyper::header::{self, HeaderValue};
use trellis_protocol::markers::{NAVIGATION_PATH, NAVIGATION_QUERY};
use trellis_protocol::{FragmentRenderResult, NavigationResponse, RenderingData};

impl App {
    /// Body of the navigation endpoint's answer, or `None` when `event` is
    /// not a navigation request.
    pub(crate) async fn navigation_response(
        &self,
        event: &mut RequestEvent,
    ) -> Result<Option<Bytes>> {
        if event.url.path() != NAVIGATION_PATH {
            return Ok(None);
        }
        let Some(to) = event
            .url
            .query_pairs()
            .find(|(key, _)| key == NAVIGATION_QUERY)
            .map(|(_, value)| value.into_owned())
        else {
            return Ok(None);
        };
        let target = match event.url.join(&to) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(to = %to, "unparsable navigation target: {e}");
                return Ok(None);
            }
        };

        let path = normalize_path(target.path());
        let Some(matched) = self.pages.at(&path) else {
            event.status = StatusCode::NOT_FOUND;
            return json(event, &not_found_page()).map(Some);
        };

        event.url = target;
        event.params = matched.params;
        let output = (matched.handler)(&mut *event)
            .await
            .map_err(Error::Handler)?;

        if event.status.is_redirection() {
            event.status = StatusCode::OK;
            let location = event
                .take_response_header(header::LOCATION)
                .and_then(|value| value.to_str().ok().map(str::to_string))
                .unwrap_or_default();
            tracing::debug!(path = %path, location = %location, "navigation redirected");
            return json(event, &NavigationResponse::Redirect { location }).map(Some);
        }

        let Some(output) = output else {
            return Ok(Some(Bytes::new()));
        };
        let rendering_data = self.renderer.render_output(output).await?;
        tracing::debug!(path = %path, fragments = ?rendering_data.fragment_ids(), "navigation rendered");
        json(event, &NavigationResponse::Page { rendering_data }).map(Some)
    }
}

fn json<T: serde::Serialize>(event: &mut RequestEvent, payload: &T) -> Result<Bytes> {
    event.set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(Bytes::from(serde_json::to_vec(payload)?))
}

/// Sent with status 404 when no page route matches the target.
fn not_found_page() -> RenderingData {
    RenderingData::page_only(FragmentRenderResult {
        id: random_page_id(),
        head: String::new(),
        body: "<h1>404 Error</h1>".to_string(),
    })
}
