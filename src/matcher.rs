use crate::template::{PositionalTemplate, Template};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

const WILDCARD: &str = "*";

/// An item in a sorted k-ary tree of filter segments. Children are kept sorted by segment with
/// the wildcard segment always last.
#[derive(Debug, Clone, Default)]
struct Node {
    segment: String,
    template: Option<Arc<Template>>,
    children: Vec<Node>,
}

impl Node {
    fn is_wildcard(&self) -> bool {
        self.segment == WILDCARD
    }

    fn insert(&mut self, segments: &[&str], template: Arc<Template>) {
        let Some((first, rest)) = segments.split_first() else {
            self.template = Some(template);
            return;
        };

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == *first) {
            child.insert(rest, template);
            return;
        }

        // A new wildcard starts out resolving to whatever its parent resolves to right now.
        let inherited = if *first == WILDCARD {
            self.template.clone()
        } else {
            None
        };
        self.children.push(Node {
            segment: first.to_string(),
            template: inherited,
            children: Vec::new(),
        });
        self.children.sort_by(|a, b| compare_segments(&a.segment, &b.segment));

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == *first) {
            child.insert(rest, template);
        }
    }

    fn search(&self, segments: &[&str]) -> Option<&Arc<Template>> {
        let (Some((first, rest)), Some(last)) = (segments.split_first(), self.children.last())
        else {
            return self.template.as_ref();
        };

        // The wildcard sorts last without being lexicographically greatest, so it is left out of
        // the binary search.
        let sorted = if last.is_wildcard() {
            &self.children[..self.children.len() - 1]
        } else {
            &self.children[..]
        };

        match sorted.binary_search_by(|c| c.segment.as_str().cmp(*first)) {
            Ok(i) => sorted[i].search(rest),
            Err(_) if last.is_wildcard() => last.search(rest),
            Err(_) => self.template.as_ref(),
        }
    }
}

/// Orders filter segments lexicographically, except that the wildcard is greater than every
/// other segment.
///
/// The filters `*.*`, `servers.*`, `servers.localhost` and `*.localhost` sort as
/// `servers.localhost`, `servers.*`, `*.localhost`, `*.*`.
fn compare_segments(a: &str, b: &str) -> Ordering {
    match (a == WILDCARD, b == WILDCARD) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.cmp(b),
    }
}

/// Collects filters and their templates before freezing them into a [`Matcher`].
#[derive(Debug)]
pub struct MatcherBuilder {
    root: Node,
    default_template: Arc<Template>,
}

impl MatcherBuilder {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            default_template: Arc::new(PositionalTemplate::greedy_measurement().into()),
        }
    }

    /// Binds `template` to a dot-delimited `filter`. An empty filter replaces the default
    /// template; a repeated filter replaces the template bound earlier.
    pub fn add(&mut self, filter: &str, template: Template) {
        if filter.is_empty() {
            self.set_default(template);
            return;
        }
        let segments = filter.split('.').collect::<Vec<_>>();
        self.root.insert(&segments, Arc::new(template));
    }

    pub fn set_default(&mut self, template: Template) {
        self.default_template = Arc::new(template);
    }

    pub fn build(self) -> Matcher {
        Matcher {
            root: self.root,
            default_template: self.default_template,
        }
    }
}

impl Default for MatcherBuilder {
    fn default() -> Self {
        MatcherBuilder::new()
    }
}

/// Selects the most specific template registered for a metric name.
#[derive(Debug, Clone)]
pub struct Matcher {
    root: Node,
    default_template: Arc<Template>,
}

impl Matcher {
    /// The template bound to the most specific filter matching `name`, if any.
    pub fn search(&self, name: &str) -> Option<&Template> {
        let segments = name.split('.').collect::<Vec<_>>();
        self.root.search(&segments).map(|t| t.as_ref())
    }

    /// Like [`Matcher::search`], falling back to the default template.
    pub fn lookup(&self, name: &str) -> &Template {
        match self.search(name) {
            Some(template) => {
                trace!(metric = name, pattern = template.pattern(), "matched filter template");
                template
            }
            None => self.default_template.as_ref(),
        }
    }

    pub fn default_template(&self) -> &Template {
        &self.default_template
    }
}

impl Default for Matcher {
    fn default() -> Self {
        MatcherBuilder::new().build()
    }
}
