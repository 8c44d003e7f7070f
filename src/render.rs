use crate::component::{Component, FragmentSpec, RenderContext};
use crate::error::{Error, Result};
use crate::markup::{escape_attr, pair_self_closing, tag_islands};
use crate::registry::ComponentRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use trellis_protocol::markers::CLIENT_CSS_PREFIX;
use trellis_protocol::{FragmentRenderResult, RenderingData};

/// What a page handler asks to have rendered.
#[derive(Debug, Clone)]
pub struct PageDescriptor {
    /// Outermost first.
    pub layouts: Vec<FragmentSpec>,
    pub page: FragmentSpec,
}

impl PageDescriptor {
    pub fn new(page: FragmentSpec) -> Self {
        Self {
            layouts: Vec::new(),
            page,
        }
    }

    /// Adds a layout inside the ones already present.
    pub fn with_layout(mut self, layout: FragmentSpec) -> Self {
        self.layouts.push(layout);
        self
    }
}

/// Result of a page handler.
#[derive(Debug, Clone)]
pub enum PageOutput {
    Render(PageDescriptor),
    /// Pre-rendered markup, served as a layout-less page with a throwaway id.
    Html { head: String, body: String },
}

impl From<PageDescriptor> for PageOutput {
    fn from(descriptor: PageDescriptor) -> Self {
        Self::Render(descriptor)
    }
}

/// Renders fragment stacks. Shared by direct document requests and the
/// navigation endpoint, so both produce identical fragments and ids.
pub struct PageRenderer {
    registry: Arc<ComponentRegistry>,
    css_manifest_dir: Option<PathBuf>,
}

impl PageRenderer {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            css_manifest_dir: None,
        }
    }

    /// Directory holding `{component name}.json` stylesheet manifests.
    pub fn with_css_manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.css_manifest_dir = Some(dir.into());
        self
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub async fn render_output(&self, output: PageOutput) -> Result<RenderingData> {
        match output {
            PageOutput::Render(descriptor) => self.render_page(&descriptor).await,
            PageOutput::Html { head, body } => {
                let id = random_page_id();
                let body = tag_islands(&pair_self_closing(&body), &id);
                Ok(RenderingData::page_only(FragmentRenderResult { id, head, body }))
            }
        }
    }

    /// Renders every layout, outermost first, then the page, all against one
    /// shared [`RenderContext`].
    pub async fn render_page(&self, descriptor: &PageDescriptor) -> Result<RenderingData> {
        let mut context = RenderContext::new();
        let mut layouts = Vec::with_capacity(descriptor.layouts.len());
        for layout in &descriptor.layouts {
            layouts.push(self.render_fragment(layout, &mut context).await?);
        }
        let page = self.render_fragment(&descriptor.page, &mut context).await?;
        Ok(RenderingData { layouts, page })
    }

    async fn render_fragment(
        &self,
        spec: &FragmentSpec,
        context: &mut RenderContext,
    ) -> Result<FragmentRenderResult> {
        let component = spec.component.as_ref();
        let stylesheets = self.stylesheets(component).await;
        let id = self.registry.register(component);
        let rendered = component
            .render(&spec.props, context)
            .map_err(|source| Error::Render {
                component: component.name().into_owned(),
                source,
            })?;

        let mut head = rendered.head;
        for name in stylesheets {
            head.push_str(&format!(
                r#"<link href="{}" rel="stylesheet" />"#,
                escape_attr(&format!("{CLIENT_CSS_PREFIX}{name}.css"))
            ));
        }

        Ok(FragmentRenderResult {
            body: tag_islands(&pair_self_closing(&rendered.body), &id),
            id,
            head,
        })
    }

    async fn stylesheets(&self, component: &dyn Component) -> Vec<String> {
        let Some(dir) = &self.css_manifest_dir else {
            return Vec::new();
        };
        let path = dir.join(format!("{}.json", component.name()));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read stylesheet manifest: {e}");
                return Vec::new();
            }
        };
        match serde_json::from_slice::<Vec<String>>(&bytes) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(path = %path.display(), "invalid stylesheet manifest: {e}");
                Vec::new()
            }
        }
    }
}

/// Throwaway id for raw-markup pages, never shared with another page.
pub(crate) fn random_page_id() -> String {
    format!("random-{:032x}", rand::random::<u128>())
}
