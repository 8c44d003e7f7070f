use crate::render::PageOutput;
use crate::request::RequestEvent;
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::Response;
use std::sync::Arc;

/// `None` sends an empty body with the event's status.
pub type PageHandler = Arc<
    dyn for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<Option<PageOutput>>>
        + Send
        + Sync,
>;

/// `None` lets the request fall through to static files.
pub type EndpointHandler = Arc<
    dyn for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<Option<Bytes>>>
        + Send
        + Sync,
>;

pub type Hook = Arc<
    dyn for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<HookOutcome>>
        + Send
        + Sync,
>;

/// What a hook decided for the request.
pub enum HookOutcome {
    Continue,
    Respond(Response<Full<Bytes>>),
}

pub fn hook<F>(f: F) -> Hook
where
    F: for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<HookOutcome>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Runs `hooks` in order until one responds.
pub fn sequence(hooks: impl IntoIterator<Item = Hook>) -> Hook {
    let hooks: Arc<[Hook]> = hooks.into_iter().collect();
    hook(move |event| {
        let hooks = hooks.clone();
        Box::pin(async move {
            for hook in hooks.iter() {
                if let HookOutcome::Respond(response) = hook(&mut *event).await? {
                    return Ok(HookOutcome::Respond(response));
                }
            }
            Ok(HookOutcome::Continue)
        })
    })
}
