use std::collections::HashMap;

pub type RouteParams = HashMap<String, String>;

/// Name a bare trailing `*` is captured under.
pub const REST_PARAM: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    /// Swallows every remaining segment, possibly none.
    Rest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    fn parse(route: &str) -> Self {
        let normalized = normalize_path(route);
        let raw: Vec<&str> = split(&normalized).collect();
        let last = raw.len().saturating_sub(1);
        let segments = raw
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                if let Some(name) = segment.strip_prefix(':').filter(|name| !name.is_empty()) {
                    Segment::Param(name.to_string())
                } else if let Some(name) = segment.strip_prefix('*').filter(|_| i == last) {
                    let name = if name.is_empty() { REST_PARAM } else { name };
                    Segment::Rest(name.to_string())
                } else {
                    Segment::Static(segment.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Static(_)))
    }

    fn matches(&self, path: &[&str]) -> Option<RouteParams> {
        let mut params = RouteParams::new();
        let mut rest = path;
        for segment in &self.segments {
            match segment {
                Segment::Static(expected) => match rest.split_first() {
                    Some((actual, tail)) if actual == expected => rest = tail,
                    _ => return None,
                },
                Segment::Param(name) => {
                    let (actual, tail) = rest.split_first()?;
                    params.insert(name.clone(), decode(actual));
                    rest = tail;
                }
                Segment::Rest(name) => {
                    let joined = rest.iter().map(|s| decode(s)).collect::<Vec<_>>().join("/");
                    params.insert(name.clone(), joined);
                    rest = &[];
                }
            }
        }
        rest.is_empty().then_some(params)
    }
}

pub struct Match<'a, H> {
    pub handler: &'a H,
    pub params: RouteParams,
}

/// Exact routes are looked up first. Patterns are tried in registration
/// order and the first one that matches wins.
pub struct Router<H> {
    exact: HashMap<String, H>,
    patterns: Vec<(Pattern, H)>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            patterns: Vec::new(),
        }
    }

    /// Registers `handler` for `route`, replacing one registered for the
    /// same route before.
    pub fn insert(&mut self, route: &str, handler: H) {
        let pattern = Pattern::parse(route);
        if pattern.is_static() {
            self.exact.insert(normalize_path(route), handler);
            return;
        }
        match self.patterns.iter_mut().find(|(p, _)| *p == pattern) {
            Some((_, existing)) => *existing = handler,
            None => self.patterns.push((pattern, handler)),
        }
    }

    /// The handler stored for exactly `route`, created with `default` when
    /// the route is new.
    pub fn entry_or_insert_with(&mut self, route: &str, default: impl FnOnce() -> H) -> &mut H {
        let pattern = Pattern::parse(route);
        if pattern.is_static() {
            return self.exact.entry(normalize_path(route)).or_insert_with(default);
        }
        let index = match self.patterns.iter().position(|(p, _)| *p == pattern) {
            Some(index) => index,
            None => {
                self.patterns.push((pattern, default()));
                self.patterns.len() - 1
            }
        };
        &mut self.patterns[index].1
    }

    pub fn at(&self, path: &str) -> Option<Match<'_, H>> {
        let path = normalize_path(path);
        if let Some(handler) = self.exact.get(&path) {
            return Some(Match {
                handler,
                params: RouteParams::new(),
            });
        }
        let segments: Vec<&str> = split(&path).collect();
        self.patterns.iter().find_map(|(pattern, handler)| {
            pattern
                .matches(&segments)
                .map(|params| Match { handler, params })
        })
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Leading `/`, no repeated or trailing slashes except for the root.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in split(path) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}
