//! `<trellis-island>` activation: wait for the trigger, `import()` the
//! module, call its `activate(runtime, element, props)`.

use super::runtime::RuntimeContext;
use super::{js_message, to_js_json};
use crate::error::{ClientError, Result};
use crate::island::{ComponentInstance, IslandSpec, IslandState, Trigger};
use futures::future::LocalBoxFuture;
use js_sys::{Array, Function, Promise, Reflect};
use std::rc::Rc;
use tracing::{debug, error, warn};
use trellis_protocol::markers::{
    FRAG_ID_ATTR, ISLAND_COMPONENT_ATTR, ISLAND_PROPS_ATTR, ISLAND_TAG, ISLAND_TRIGGER_ATTR,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    AddEventListenerOptions, Element, IntersectionObserver, IntersectionObserverEntry, Node,
};

/// The object an island module's `activate` returned.
pub(crate) struct JsInstance(pub(crate) JsValue);

impl ComponentInstance for JsInstance {
    fn unmount(&self) -> LocalBoxFuture<'_, ()> {
        Box::pin(async move {
            let unmount = Reflect::get(&self.0, &JsValue::from_str("unmount"))
                .ok()
                .and_then(|f| f.dyn_into::<Function>().ok());
            let Some(unmount) = unmount else {
                warn!("island instance has no unmount()");
                return;
            };
            let settled = match unmount.call0(&self.0) {
                Ok(value) => JsFuture::from(Promise::resolve(&value)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = settled {
                warn!("island unmount failed: {}", js_message(&e));
            }
        })
    }
}

/// Activates the islands `fragment_id` owns below `body`. Islands of
/// nested fragments are left to their own fragment.
pub(crate) fn activate_in(runtime: &RuntimeContext, fragment_id: &str, body: &Node) {
    let Some(body) = body.dyn_ref::<Element>() else {
        return;
    };
    let selector = format!("{ISLAND_TAG}[{FRAG_ID_ATTR}=\"{fragment_id}\"]");
    let Ok(islands) = body.query_selector_all(&selector) else {
        return;
    };
    for i in 0..islands.length() {
        if let Some(element) = islands.item(i).and_then(|n| n.dyn_into::<Element>().ok()) {
            activate(runtime, element);
        }
    }
}

fn activate(runtime: &RuntimeContext, element: Element) {
    let spec = IslandSpec::from_attributes(
        element.get_attribute(ISLAND_COMPONENT_ATTR).as_deref(),
        element.get_attribute(ISLAND_PROPS_ATTR).as_deref(),
        element.get_attribute(ISLAND_TRIGGER_ATTR).as_deref(),
        element.get_attribute(FRAG_ID_ATTR).as_deref(),
    );
    let Some(spec) = spec else {
        warn!("skipping island without a component or fragment id");
        return;
    };
    let spec = Rc::new(spec);
    let state = Rc::new(IslandState::default());
    let runtime = runtime.clone();

    match spec.trigger {
        Trigger::Immediate => load(runtime, element, spec, state),
        Trigger::Visible => {
            let target = element.clone();
            let callback = Closure::<dyn FnMut(Array, IntersectionObserver)>::new(
                move |entries: Array, observer: IntersectionObserver| {
                    let visible = entries.iter().any(|entry| {
                        entry
                            .unchecked_into::<IntersectionObserverEntry>()
                            .is_intersecting()
                    });
                    if visible {
                        observer.disconnect();
                        load(runtime.clone(), target.clone(), spec.clone(), state.clone());
                    }
                },
            )
            .into_js_value();
            match IntersectionObserver::new(callback.unchecked_ref()) {
                Ok(observer) => observer.observe(&element),
                Err(e) => error!("cannot observe island visibility: {}", js_message(&e)),
            }
        }
        Trigger::Click | Trigger::MouseEnter => {
            let event = spec.trigger.event_name().unwrap_or("click");
            let options = AddEventListenerOptions::new();
            options.set_once(true);
            let target = element.clone();
            let listener = Closure::once_into_js(move || load(runtime, target, spec, state));
            if let Err(e) = element.add_event_listener_with_callback_and_add_event_listener_options(
                event,
                listener.unchecked_ref(),
                &options,
            ) {
                error!("cannot listen for island trigger: {}", js_message(&e));
            }
        }
    }
}

fn load(runtime: RuntimeContext, element: Element, spec: Rc<IslandSpec>, state: Rc<IslandState>) {
    if !state.fire() {
        return;
    }
    wasm_bindgen_futures::spawn_local(async move {
        let module = match import(&spec.component).await {
            Ok(module) => module,
            Err(e) => {
                state.abandon();
                error!(component = %spec.component, "island module failed to load: {}", js_message(&e));
                return;
            }
        };
        if !state.loaded(element.is_connected()) {
            debug!(component = %spec.component, "island left the document while loading");
            return;
        }
        match mount(&module, &runtime, &element, &spec) {
            Ok(instance) => runtime
                .navigator()
                .manager()
                .register_component_instance(&spec.fragment_id, Box::new(JsInstance(instance))),
            Err(e) => {
                state.abandon();
                error!(component = %spec.component, "island failed to mount: {e}");
            }
        }
    });
}

async fn import(specifier: &str) -> std::result::Result<JsValue, JsValue> {
    let import = Function::new_with_args("specifier", "return import(specifier)");
    let pending: Promise = import
        .call1(&JsValue::NULL, &JsValue::from_str(specifier))?
        .dyn_into()?;
    JsFuture::from(pending).await
}

fn mount(
    module: &JsValue,
    runtime: &RuntimeContext,
    element: &Element,
    spec: &IslandSpec,
) -> Result<JsValue> {
    let activate: Function = Reflect::get(module, &JsValue::from_str("activate"))?
        .dyn_into()
        .map_err(|_| ClientError::Dom(format!("{} exports no activate()", spec.component)))?;
    let props = to_js_json(&spec.props)?;
    Ok(activate.call3(
        &JsValue::NULL,
        &JsValue::from(runtime.clone()),
        element,
        &props,
    )?)
}
