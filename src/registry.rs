use crate::component::{Component, DefinitionKey};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sha1::{Digest, Sha1};
use std::fmt::Write;

/// Maps component definitions to fragment ids and back.
///
/// Ids are derived from the definition itself, never from request or render
/// counts, so a layout shared by two pages gets the same id on both and the
/// client can keep it mounted across a navigation. Entries are never evicted.
pub struct ComponentRegistry {
    ids: DashMap<DefinitionKey, String>,
    definitions: DashMap<String, DefinitionKey>,
    hasher: fn(&DefinitionKey) -> String,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::with_hasher(definition_hash)
    }

    pub fn with_hasher(hasher: fn(&DefinitionKey) -> String) -> Self {
        Self {
            ids: DashMap::new(),
            definitions: DashMap::new(),
            hasher,
        }
    }

    /// Returns the id of `component`, assigning one on first sight.
    pub fn register(&self, component: &dyn Component) -> String {
        let key = component.definition_key();
        if let Some(id) = self.ids.get(&key) {
            return id.value().clone();
        }

        // `ids` is always locked before `definitions`.
        match self.ids.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let base = (self.hasher)(entry.key());
                let mut candidate = base.clone();
                let mut suffix = 1;
                loop {
                    match self.definitions.entry(candidate.clone()) {
                        Entry::Vacant(slot) => {
                            slot.insert(entry.key().clone());
                            break;
                        }
                        Entry::Occupied(_) => {
                            suffix += 1;
                            candidate = format!("{base}-{suffix}");
                        }
                    }
                }
                tracing::debug!(
                    component = %component.name(),
                    id = %candidate,
                    "registered component"
                );
                entry.insert(candidate.clone());
                candidate
            }
        }
    }

    pub fn id_of(&self, component: &dyn Component) -> Option<String> {
        self.ids
            .get(&component.definition_key())
            .map(|id| id.value().clone())
    }

    pub fn definition_of(&self, id: &str) -> Option<DefinitionKey> {
        self.definitions.get(id).map(|key| key.value().clone())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// First 16 hex digits of SHA-1 over the type name and discriminant.
fn definition_hash(key: &DefinitionKey) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.type_name.as_bytes());
    hasher.update(b"#");
    if let Some(discriminant) = &key.discriminant {
        hasher.update(discriminant.as_bytes());
    }
    let digest = hasher.finalize();
    digest[..8].iter().fold(String::with_capacity(16), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{FnComponent, Markup, RenderContext, Rendered};
    use serde_json::Value;
    use std::sync::Arc;

    struct Layout;
    struct Page;

    impl Component for Layout {
        fn render(&self, _: &Value, _: &mut RenderContext) -> anyhow::Result<Rendered> {
            Ok(Rendered::body("<trellis-slot></trellis-slot>"))
        }
    }

    impl Component for Page {
        fn render(&self, _: &Value, _: &mut RenderContext) -> anyhow::Result<Rendered> {
            Ok(Rendered::body("page"))
        }
    }

    #[test]
    fn registering_twice_returns_the_same_id() {
        let registry = ComponentRegistry::new();
        let first = registry.register(&Layout);
        let second = registry.register(&Layout);
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_definitions_get_distinct_ids() {
        let registry = ComponentRegistry::new();
        let layout = registry.register(&Layout);
        let page = registry.register(&Page);
        let a = registry.register(&Markup::new("a", ""));
        let b = registry.register(&Markup::new("b", ""));
        let ids = [&layout, &page, &a, &b];
        for (i, x) in ids.iter().enumerate() {
            for y in &ids[i + 1..] {
                assert_ne!(x, y);
            }
        }
    }

    #[test]
    fn ids_are_stable_across_registries() {
        assert_eq!(
            ComponentRegistry::new().register(&Layout),
            ComponentRegistry::new().register(&Layout)
        );
    }

    #[test]
    fn same_named_markup_with_other_content_gets_its_own_id() {
        let registry = ComponentRegistry::new();
        let a = registry.register(&Markup::new(
            "layout",
            "<header>A</header><trellis-slot></trellis-slot>",
        ));
        let b = registry.register(&Markup::new(
            "layout",
            "<footer>B</footer><trellis-slot></trellis-slot>",
        ));
        assert_ne!(a, b);
        assert!(!a.contains('-') && !b.contains('-'));
    }

    #[test]
    fn closure_ids_do_not_depend_on_registration_order() {
        let make = |name: &'static str| {
            FnComponent::new(name, |_: &Value, _: &mut RenderContext| Ok(Rendered::default()))
        };
        let (first, second) = (make("first"), make("second"));

        let one = ComponentRegistry::new();
        let one_first = one.register(&first);
        let one_second = one.register(&second);

        let two = ComponentRegistry::new();
        let two_second = two.register(&second);
        let two_first = two.register(&first);

        assert_ne!(one_first, one_second);
        assert_eq!(one_first, two_first);
        assert_eq!(one_second, two_second);
    }

    #[test]
    fn trait_objects_resolve_to_the_concrete_definition() {
        let registry = ComponentRegistry::new();
        let shared: Arc<dyn Component> = Arc::new(Layout);
        assert_eq!(registry.register(shared.as_ref()), registry.register(&Layout));
    }

    #[test]
    fn hash_collisions_are_disambiguated() {
        let registry = ComponentRegistry::with_hasher(|_| "same".to_string());
        let layout = registry.register(&Layout);
        let page = registry.register(&Page);
        assert_eq!(layout, "same");
        assert_eq!(page, "same-2");
        assert_eq!(registry.register(&Page), "same-2");
        assert_eq!(
            registry.definition_of("same-2").map(|key| key.type_name),
            Some(std::any::type_name::<Page>())
        );
    }

    #[test]
    fn concurrent_registration_agrees_on_one_id() {
        let registry = Arc::new(ComponentRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register(&Layout))
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(registry.len(), 1);
    }
}
