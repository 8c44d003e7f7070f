use crate::assemble::{AssemblyOptions, DEFAULT_TEMPLATE, assemble_page};
use crate::config::TrellisConfig;
use crate::error::{Error, Result};
use crate::handler::{EndpointHandler, Hook, HookOutcome, PageHandler};
use crate::registry::ComponentRegistry;
use crate::render::{PageOutput, PageRenderer};
use crate::request::RequestEvent;
use crate::router::{Router, normalize_path};
use crate::static_files::{self, StaticFile};
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use trellis_protocol::markers::CLIENT_ASSET_PREFIX;

#[derive(Default)]
struct MethodHandlers {
    by_method: HashMap<Method, EndpointHandler>,
    /// Used when no handler is registered for the request method.
    any: Option<EndpointHandler>,
}

impl MethodHandlers {
    fn for_method(&self, method: &Method) -> Option<&EndpointHandler> {
        self.by_method.get(method).or(self.any.as_ref())
    }
}

/// Routes requests to page handlers, endpoints and files.
pub struct App {
    pub(crate) renderer: PageRenderer,
    pub(crate) pages: Router<PageHandler>,
    template: String,
    assembly: AssemblyOptions,
    endpoints: Router<MethodHandlers>,
    hook: Option<Hook>,
    client_dir: Option<PathBuf>,
    static_dir: Option<PathBuf>,
}

impl App {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            renderer: PageRenderer::new(Arc::new(ComponentRegistry::new())),
            pages: Router::new(),
            template: template.into(),
            assembly: AssemblyOptions::default(),
            endpoints: Router::new(),
            hook: None,
            client_dir: None,
            static_dir: None,
        }
    }

    /// Reads the template and wires every directory `config` names. A
    /// missing template falls back to [`DEFAULT_TEMPLATE`].
    pub async fn from_config(config: &TrellisConfig) -> Result<Self> {
        let template_path = config.template_path();
        let template = match tokio::fs::read_to_string(&template_path).await {
            Ok(template) => template,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %template_path.display(),
                    "template not found, using the built-in one"
                );
                DEFAULT_TEMPLATE.to_string()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self::new(template)
            .with_renderer(
                PageRenderer::new(Arc::new(ComponentRegistry::new()))
                    .with_css_manifest_dir(config.css_manifest_dir()),
            )
            .with_assembly(AssemblyOptions {
                dev_scripts: config.dev_scripts(),
                client_entry: config.client.entry.clone(),
            })
            .with_client_dir(config.client_dir())
            .with_static_dir(config.static_dir()))
    }

    pub fn with_renderer(mut self, renderer: PageRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_assembly(mut self, assembly: AssemblyOptions) -> Self {
        self.assembly = assembly;
        self
    }

    pub fn with_client_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.client_dir = Some(dir.into());
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    pub fn renderer(&self) -> &PageRenderer {
        &self.renderer
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        self.renderer.registry()
    }

    pub fn page<F>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<Option<PageOutput>>>
            + Send
            + Sync
            + 'static,
    {
        self.pages.insert(route, Arc::new(handler));
        self
    }

    pub fn get<F>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<Option<Bytes>>>
            + Send
            + Sync
            + 'static,
    {
        self.endpoint(route, Some(Method::GET), Arc::new(handler))
    }

    pub fn post<F>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<Option<Bytes>>>
            + Send
            + Sync
            + 'static,
    {
        self.endpoint(route, Some(Method::POST), Arc::new(handler))
    }

    pub fn put<F>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<Option<Bytes>>>
            + Send
            + Sync
            + 'static,
    {
        self.endpoint(route, Some(Method::PUT), Arc::new(handler))
    }

    pub fn delete<F>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<Option<Bytes>>>
            + Send
            + Sync
            + 'static,
    {
        self.endpoint(route, Some(Method::DELETE), Arc::new(handler))
    }

    /// Answers any method without a more specific handler on `route`.
    pub fn all<F>(&mut self, route: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut RequestEvent) -> BoxFuture<'a, anyhow::Result<Option<Bytes>>>
            + Send
            + Sync
            + 'static,
    {
        self.endpoint(route, None, Arc::new(handler))
    }

    /// `method` of `None` registers the fallback for every method.
    pub fn endpoint(
        &mut self,
        route: &str,
        method: Option<Method>,
        handler: EndpointHandler,
    ) -> &mut Self {
        let handlers = self.endpoints.entry_or_insert_with(route, MethodHandlers::default);
        match method {
            Some(method) => {
                handlers.by_method.insert(method, handler);
            }
            None => handlers.any = Some(handler),
        }
        self
    }

    /// Replaces the hook. Use [`crate::sequence`] to install several.
    pub fn hook(&mut self, hook: Hook) -> &mut Self {
        self.hook = Some(hook);
        self
    }

    /// Never fails: errors become a bare 500.
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Full<Bytes>> {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = match self.dispatch(RequestEvent::new(request)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(%method, %path, "request failed: {:?}", anyhow::Error::from(e));
                bare(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
            }
        };

        tracing::info!(
            %method,
            %path,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "handled request"
        );
        response
    }

    async fn dispatch(&self, mut event: RequestEvent) -> Result<Response<Full<Bytes>>> {
        if let Some(hook) = &self.hook {
            if let HookOutcome::Respond(response) = hook(&mut event).await.map_err(Error::Handler)? {
                return Ok(response);
            }
        }

        if let Some(relative) = client_asset_path(event.url.path()) {
            let relative = relative.to_string();
            return Ok(self.client_asset(event, &relative).await);
        }

        if let Some(body) = self.navigation_response(&mut event).await? {
            return Ok(event.into_response(body));
        }

        let path = normalize_path(event.url.path());
        if let Some(matched) = self.pages.at(&path) {
            event.params = matched.params;
            let body = self.page_document(&mut event, matched.handler).await?;
            return Ok(event.into_response(body));
        }

        if let Some(matched) = self.endpoints.at(&path) {
            if let Some(handler) = matched.handler.for_method(&event.method) {
                event.params = matched.params;
                if let Some(body) = handler(&mut event).await.map_err(Error::Handler)? {
                    return Ok(event.into_response(body));
                }
            }
        }

        if let Some(static_dir) = &self.static_dir {
            match static_files::lookup(static_dir, event.url.path()).await {
                StaticFile::Found {
                    contents,
                    content_type,
                } => {
                    event.set_header(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                    return Ok(event.into_response(Bytes::from(contents)));
                }
                StaticFile::Forbidden => {
                    return Ok(bare(StatusCode::FORBIDDEN, Bytes::from_static(b"Forbidden")));
                }
                StaticFile::Missing => {}
            }
        }

        Ok(bare(StatusCode::NOT_FOUND, Bytes::from_static(b"404 Error")))
    }

    /// Runs a page handler and assembles the full document.
    async fn page_document(
        &self,
        event: &mut RequestEvent,
        handler: &PageHandler,
    ) -> Result<Bytes> {
        let output = handler(&mut *event).await.map_err(Error::Handler)?;
        let Some(output) = output else {
            return Ok(Bytes::new());
        };
        if event.status.is_redirection() {
            return Ok(Bytes::new());
        }

        let data = self.renderer.render_output(output).await?;
        let document = assemble_page(&self.template, &data, &self.assembly)?;
        event.set_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        Ok(Bytes::from(document))
    }

    async fn client_asset(&self, mut event: RequestEvent, relative: &str) -> Response<Full<Bytes>> {
        let Some(client_dir) = &self.client_dir else {
            event.status = StatusCode::NOT_FOUND;
            return event.into_response(Bytes::new());
        };
        match static_files::lookup(client_dir, relative).await {
            StaticFile::Found {
                contents,
                content_type,
            } => {
                event.set_header(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                event.into_response(Bytes::from(contents))
            }
            StaticFile::Forbidden => bare(StatusCode::FORBIDDEN, Bytes::from_static(b"Forbidden")),
            StaticFile::Missing => {
                event.status = StatusCode::NOT_FOUND;
                event.into_response(Bytes::new())
            }
        }
    }
}

/// Path below the client asset prefix, `""` for the prefix itself.
fn client_asset_path(path: &str) -> Option<&str> {
    let prefix = CLIENT_ASSET_PREFIX.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

pub(crate) fn bare(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
}
