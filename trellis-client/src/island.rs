use futures::future::LocalBoxFuture;
use serde_json::Value;
use std::cell::Cell;
use tracing::warn;

/// When an island's module gets loaded, from its `trigger` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Immediate,
    /// First time the element intersects the viewport.
    Visible,
    Click,
    MouseEnter,
}

impl Trigger {
    pub fn parse(attribute: Option<&str>) -> Self {
        match attribute.map(str::trim) {
            Some("visible") => Self::Visible,
            Some("click") => Self::Click,
            Some("mouseenter") => Self::MouseEnter,
            _ => Self::Immediate,
        }
    }

    /// DOM event that fires the trigger, for the event-driven ones.
    pub fn event_name(self) -> Option<&'static str> {
        match self {
            Self::Click => Some("click"),
            Self::MouseEnter => Some("mouseenter"),
            Self::Immediate | Self::Visible => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IslandActivation {
    Unactivated,
    Loading,
    Mounted,
    /// Removed from the document before its module finished loading.
    Detached,
}

/// Per-island activation state. Each island loads and mounts at most once.
#[derive(Debug)]
pub struct IslandState {
    state: Cell<IslandActivation>,
}

impl Default for IslandState {
    fn default() -> Self {
        Self {
            state: Cell::new(IslandActivation::Unactivated),
        }
    }
}

impl IslandState {
    pub fn get(&self) -> IslandActivation {
        self.state.get()
    }

    /// Moves to `Loading`. False if the trigger already fired.
    pub fn fire(&self) -> bool {
        if self.state.get() != IslandActivation::Unactivated {
            return false;
        }
        self.state.set(IslandActivation::Loading);
        true
    }

    /// Settles a finished load. True when the island should be mounted,
    /// false when it left the document meanwhile.
    pub fn loaded(&self, still_attached: bool) -> bool {
        if self.state.get() != IslandActivation::Loading {
            return false;
        }
        if still_attached {
            self.state.set(IslandActivation::Mounted);
            true
        } else {
            self.state.set(IslandActivation::Detached);
            false
        }
    }

    /// A load that failed leaves the island inert.
    pub fn abandon(&self) {
        self.state.set(IslandActivation::Detached);
    }
}

/// What a `<trellis-island>` element asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandSpec {
    /// Module specifier handed to `import()`.
    pub component: String,
    pub props: Value,
    pub trigger: Trigger,
    pub fragment_id: String,
}

impl IslandSpec {
    /// `None` when the element lacks the module or owning fragment.
    pub fn from_attributes(
        component: Option<&str>,
        props: Option<&str>,
        trigger: Option<&str>,
        fragment_id: Option<&str>,
    ) -> Option<Self> {
        let component = component.filter(|c| !c.is_empty())?;
        let fragment_id = fragment_id.filter(|id| !id.is_empty())?;
        let props = match props {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|error| {
                warn!(%component, %error, "island props are not JSON, mounting without them");
                Value::Null
            }),
            None => Value::Null,
        };
        Some(Self {
            component: component.to_string(),
            props,
            trigger: Trigger::parse(trigger),
            fragment_id: fragment_id.to_string(),
        })
    }
}

/// A mounted island, torn down when its fragment is destroyed.
pub trait ComponentInstance {
    fn unmount(&self) -> LocalBoxFuture<'_, ()>;
}
