use serde_json::Value;
use sha1::{Digest, Sha1};
use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

/// Head and body markup produced by one component render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub head: String,
    pub body: String,
}

impl Rendered {
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            head: String::new(),
            body: body.into(),
        }
    }

    pub fn with_head(mut self, head: impl Into<String>) -> Self {
        self.head = head.into();
        self
    }
}

/// Key-value store shared by every fragment of a single page render, so a
/// layout can publish data that the page nested inside it reads.
#[derive(Debug, Default)]
pub struct RenderContext {
    values: HashMap<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}

/// A compiled component: turns props into head and body markup.
pub trait Component: Send + Sync + 'static {
    fn render(&self, props: &Value, context: &mut RenderContext) -> anyhow::Result<Rendered>;

    /// Used in logs and to find the component's stylesheet manifest.
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(short_type_name(type_name::<Self>()))
    }

    /// Separates distinct definitions that share one Rust type, e.g. two
    /// [`Markup`] values.
    fn discriminant(&self) -> Option<Cow<'_, str>> {
        None
    }

    /// Identity of this definition for [`crate::ComponentRegistry`].
    fn definition_key(&self) -> DefinitionKey {
        DefinitionKey {
            type_id: TypeId::of::<Self>(),
            type_name: type_name::<Self>(),
            discriminant: self.discriminant().map(Cow::into_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefinitionKey {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub discriminant: Option<String>,
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A layout or page paired with the props to render it with.
#[derive(Clone)]
pub struct FragmentSpec {
    pub component: Arc<dyn Component>,
    pub props: Value,
}

impl FragmentSpec {
    pub fn new(component: Arc<dyn Component>) -> Self {
        Self {
            component,
            props: Value::Null,
        }
    }

    pub fn with_props(mut self, props: impl Into<Value>) -> Self {
        self.props = props.into();
        self
    }
}

impl std::fmt::Debug for FragmentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentSpec")
            .field("component", &self.component.name())
            .field("props", &self.props)
            .finish()
    }
}

/// Wraps a render closure. Closures written in the same function share a
/// type name, so the name given here must be unique among them.
pub struct FnComponent<F> {
    name: String,
    render: F,
}

impl<F> FnComponent<F>
where
    F: Fn(&Value, &mut RenderContext) -> anyhow::Result<Rendered> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, render: F) -> Self {
        Self {
            name: name.into(),
            render,
        }
    }
}

impl<F> Component for FnComponent<F>
where
    F: Fn(&Value, &mut RenderContext) -> anyhow::Result<Rendered> + Send + Sync + 'static,
{
    fn render(&self, props: &Value, context: &mut RenderContext) -> anyhow::Result<Rendered> {
        (self.render)(props, context)
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn discriminant(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.name))
    }
}

/// Fixed markup. `{{key}}` in either half is replaced by the string form of
/// the matching top-level prop. Identity covers the name and both halves, so
/// same-named markup with different content is a different definition.
#[derive(Debug, Clone)]
pub struct Markup {
    name: String,
    head: String,
    body: String,
}

impl Markup {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            head: String::new(),
            body: body.into(),
        }
    }

    pub fn with_head(mut self, head: impl Into<String>) -> Self {
        self.head = head.into();
        self
    }
}

impl Component for Markup {
    fn render(&self, props: &Value, _context: &mut RenderContext) -> anyhow::Result<Rendered> {
        Ok(Rendered {
            head: interpolate(&self.head, props),
            body: interpolate(&self.body, props),
        })
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn discriminant(&self) -> Option<Cow<'_, str>> {
        let mut hasher = Sha1::new();
        hasher.update(self.head.as_bytes());
        hasher.update([0]);
        hasher.update(self.body.as_bytes());
        let digest = hasher.finalize();
        let mut discriminant = format!("{}#", self.name);
        for byte in digest.iter() {
            let _ = write!(discriminant, "{byte:02x}");
        }
        Some(Cow::Owned(discriminant))
    }
}

fn interpolate(template: &str, props: &Value) -> String {
    let Some(props) = props.as_object() else {
        return template.to_string();
    };
    let mut out = template.to_string();
    for (key, value) in props {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&format!("{{{{{key}}}}}"), &text);
    }
    out
}
