//! Headless [`Document`] backed by `scraper`.
//!
//! The page is parsed once into an owned arena so the document is `Send +
//! Sync` and can be shared with the assistant task. CSS selectors are matched
//! with `scraper::Selector` against a fresh parse of the original markup;
//! the node order of that parse lines up with the arena. Writes (form
//! values, text, location) only touch the arena, so selectors always see the
//! original structure and attribute values.

use std::collections::HashMap;

use parking_lot::RwLock;
use scraper::{Html, Selector};
use tracing::debug;

use crate::document::{DomEventKind, Document, NodeId};
use crate::errors::{DomError, Result};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// A synthetic event recorded by [`MemoryDocument::dispatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchedEvent {
    /// Event target.
    pub node: NodeId,
    /// Event kind.
    pub kind: DomEventKind,
}

/// A navigation recorded by [`MemoryDocument::navigate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Navigation {
    /// Resolved absolute URL.
    pub url: String,
    /// Browsing-context target, if any.
    pub target: Option<String>,
}

#[derive(Debug)]
enum Data {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Other,
}

#[derive(Debug)]
struct Slot {
    parent: Option<usize>,
    children: Vec<usize>,
    data: Data,
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    location: String,
    values: HashMap<usize, String>,
    dispatched: Vec<DispatchedEvent>,
    navigations: Vec<Navigation>,
}

impl Arena {
    fn element(&self, node: NodeId) -> Option<(&str, &[(String, String)])> {
        match &self.slots.get(node.0)?.data {
            Data::Element { tag, attrs } => Some((tag.as_str(), attrs.as_slice())),
            _ => None,
        }
    }

    fn text_of(&self, idx: usize, out: &mut String) {
        let Some(slot) = self.slots.get(idx) else {
            return;
        };
        match &slot.data {
            Data::Text(t) => out.push_str(t),
            Data::Element { .. } => {
                for &child in &slot.children {
                    self.text_of(child, out);
                }
            }
            Data::Other => {}
        }
    }

    fn attr<'a>(&'a self, idx: usize, name: &str) -> Option<&'a str> {
        let (_, attrs) = self.element(NodeId(idx))?;
        attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn descendants(&self, idx: usize, out: &mut Vec<usize>) {
        if let Some(slot) = self.slots.get(idx) {
            for &child in &slot.children {
                out.push(child);
                self.descendants(child, out);
            }
        }
    }

    fn serialize(&self, idx: usize, out: &mut String) {
        let Some(slot) = self.slots.get(idx) else {
            return;
        };
        match &slot.data {
            Data::Text(t) => escape_into(t, false, out),
            Data::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (k, v) in attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    escape_into(v, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for &child in &slot.children {
                    self.serialize(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Data::Other => {}
        }
    }
}

fn escape_into(s: &str, attr: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

/// Resolve `url` against the page at `base` (absolute, root-relative, or
/// path-relative).
fn resolve_url(base: &str, url: &str) -> String {
    if url.contains("://") {
        return url.to_owned();
    }
    let (origin, path) = match base.find("://") {
        Some(i) => {
            let after = &base[i + 3..];
            match after.find('/') {
                Some(j) => base.split_at(i + 3 + j),
                None => (base, "/"),
            }
        }
        None => ("", base),
    };
    if url.starts_with('/') {
        return format!("{origin}{url}");
    }
    let path = path.split(['?', '#']).next().unwrap_or("/");
    let dir = path.rfind('/').map_or("/", |k| &path[..=k]);
    format!("{origin}{dir}{url}")
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| DomError::InvalidSelector {
        selector: selector.to_owned(),
        reason: format!("{e:?}"),
    })
}

/// In-memory page for tests and headless replay.
#[derive(Debug)]
pub struct MemoryDocument {
    source: String,
    state: RwLock<Arena>,
}

impl MemoryDocument {
    /// Parse `html` as a full document located at `location`.
    #[must_use]
    pub fn parse(html: &str, location: impl Into<String>) -> Self {
        let parsed = Html::parse_document(html);
        let mut arena = Arena {
            location: location.into(),
            ..Arena::default()
        };
        let mut index = HashMap::new();

        for (i, node) in parsed.tree.root().descendants().enumerate() {
            let _ = index.insert(node.id(), i);
            let parent = node.parent().and_then(|p| index.get(&p.id()).copied());
            let data = match node.value() {
                scraper::Node::Element(el) => Data::Element {
                    tag: el.name().to_ascii_lowercase(),
                    attrs: el
                        .attrs()
                        .map(|(k, v)| (k.to_owned(), v.to_owned()))
                        .collect(),
                },
                scraper::Node::Text(t) => Data::Text((**t).to_owned()),
                _ => Data::Other,
            };
            if let Some(p) = parent {
                if let Some(slot) = arena.slots.get_mut(p) {
                    slot.children.push(i);
                }
            }
            arena.slots.push(Slot {
                parent,
                children: Vec::new(),
                data,
            });
        }

        Self {
            source: html.to_owned(),
            state: RwLock::new(arena),
        }
    }

    /// All elements matching `selector`, in document order.
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let selector = parse_selector(selector)?;
        let html = Html::parse_document(&self.source);
        let matched: Vec<_> = html.select(&selector).map(|el| el.id()).collect();
        Ok(html
            .tree
            .root()
            .descendants()
            .enumerate()
            .filter(|(_, n)| matched.contains(&n.id()))
            .map(|(i, _)| NodeId(i))
            .collect())
    }

    /// Replace the element's content with a single text node.
    pub fn set_text(&self, node: NodeId, text: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.element(node).is_none() {
            return Err(DomError::UnknownNode(node));
        }
        let idx = state.slots.len();
        state.slots.push(Slot {
            parent: Some(node.0),
            children: Vec::new(),
            data: Data::Text(text.to_owned()),
        });
        if let Some(slot) = state.slots.get_mut(node.0) {
            slot.children = vec![idx];
        }
        Ok(())
    }

    /// Set or replace an attribute.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()> {
        let mut state = self.state.write();
        match state.slots.get_mut(node.0).map(|s| &mut s.data) {
            Some(Data::Element { attrs, .. }) => {
                match attrs.iter_mut().find(|(k, _)| k == name) {
                    Some((_, v)) => value.clone_into(v),
                    None => attrs.push((name.to_owned(), value.to_owned())),
                }
                Ok(())
            }
            _ => Err(DomError::UnknownNode(node)),
        }
    }

    /// Replace the current URL without recording a navigation.
    pub fn set_location(&self, url: &str) {
        let mut state = self.state.write();
        let resolved = resolve_url(&state.location, url);
        state.location = resolved;
    }

    /// Events dispatched so far.
    #[must_use]
    pub fn dispatched(&self) -> Vec<DispatchedEvent> {
        self.state.read().dispatched.clone()
    }

    /// Navigations requested so far.
    #[must_use]
    pub fn navigations(&self) -> Vec<Navigation> {
        self.state.read().navigations.clone()
    }
}

impl Document for MemoryDocument {
    fn location(&self) -> String {
        self.state.read().location.clone()
    }

    fn body(&self) -> Option<NodeId> {
        let state = self.state.read();
        (0..state.slots.len())
            .map(NodeId)
            .find(|&n| matches!(state.element(n), Some(("body", _))))
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let state = self.state.read();
        (0..state.slots.len())
            .find(|&i| state.attr(i, "id") == Some(id))
            .map(NodeId)
    }

    fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        let selector = parse_selector(selector)?;
        let html = Html::parse_document(&self.source);
        let Some(found) = html.select(&selector).next() else {
            return Ok(None);
        };
        let target = found.id();
        Ok(html
            .tree
            .root()
            .descendants()
            .position(|n| n.id() == target)
            .map(NodeId))
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.state.read().element(node).map(|(tag, _)| tag.to_owned())
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.state
            .read()
            .element(node)
            .map(|(_, attrs)| attrs.to_vec())
            .unwrap_or_default()
    }

    fn text_content(&self, node: NodeId) -> Option<String> {
        let state = self.state.read();
        if state.element(node).is_none() {
            return None;
        }
        let mut out = String::new();
        state.text_of(node.0, &mut out);
        Some(out)
    }

    fn form_value(&self, node: NodeId) -> Option<String> {
        let state = self.state.read();
        let (tag, _) = state.element(node)?;
        if let Some(v) = state.values.get(&node.0) {
            return Some(v.clone());
        }
        match tag {
            "input" => Some(state.attr(node.0, "value").unwrap_or_default().to_owned()),
            "textarea" => {
                let mut out = String::new();
                state.text_of(node.0, &mut out);
                Some(out)
            }
            "select" => {
                let mut all = Vec::new();
                state.descendants(node.0, &mut all);
                let options: Vec<usize> = all
                    .into_iter()
                    .filter(|&i| matches!(state.element(NodeId(i)), Some(("option", _))))
                    .collect();
                let chosen = options
                    .iter()
                    .copied()
                    .find(|&i| state.attr(i, "selected").is_some())
                    .or_else(|| options.first().copied())?;
                state.attr(chosen, "value").map(str::to_owned).or_else(|| {
                    let mut out = String::new();
                    state.text_of(chosen, &mut out);
                    Some(out.trim().to_owned())
                })
            }
            _ => None,
        }
    }

    fn outer_html(&self, node: NodeId) -> Option<String> {
        let state = self.state.read();
        if state.element(node).is_none() {
            return None;
        }
        let mut out = String::new();
        state.serialize(node.0, &mut out);
        Some(out)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        let state = self.state.read();
        let parent = state.slots.get(node.0)?.parent?;
        state.element(NodeId(parent)).map(|_| NodeId(parent))
    }

    fn child_elements(&self, node: NodeId) -> Vec<NodeId> {
        let state = self.state.read();
        state
            .slots
            .get(node.0)
            .map(|slot| {
                slot.children
                    .iter()
                    .map(|&c| NodeId(c))
                    .filter(|&c| state.element(c).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_form_value(&self, node: NodeId, value: &str) -> Result<()> {
        let mut state = self.state.write();
        let tag = state.element(node).map(|(tag, _)| tag.to_owned());
        match tag.as_deref() {
            Some("input" | "textarea" | "select") => {
                let _ = state.values.insert(node.0, value.to_owned());
                Ok(())
            }
            Some(_) => Err(DomError::NotFormControl(node)),
            None => Err(DomError::UnknownNode(node)),
        }
    }

    fn dispatch(&self, node: NodeId, event: DomEventKind) -> Result<()> {
        let mut state = self.state.write();
        if state.element(node).is_none() {
            return Err(DomError::UnknownNode(node));
        }
        debug!(%node, ?event, "dispatch");
        state.dispatched.push(DispatchedEvent { node, kind: event });
        Ok(())
    }

    fn navigate(&self, url: &str, target: Option<&str>) -> Result<()> {
        if url.trim().is_empty() {
            return Err(DomError::Navigation(url.to_owned()));
        }
        let mut state = self.state.write();
        let resolved = resolve_url(&state.location, url);
        let same_context = matches!(target, None | Some("_self" | "_top" | "_parent"));
        state.navigations.push(Navigation {
            url: resolved.clone(),
            target: target.map(str::to_owned),
        });
        if same_context {
            state.location = resolved;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PAGE: &str = r#"<!doctype html>
<html><head><title>Shop</title></head>
<body>
  <div id="product" class="card">
    <h2>Blue Mug</h2>
    <span class="price">$12</span>
    <button id="add-to-cart" class="btn primary">Add to cart</button>
  </div>
  <form id="checkout">
    <input id="email" name="email" value="a@b.test">
    <textarea id="note">gift wrap</textarea>
    <select id="size"><option value="s">S</option><option value="m" selected>M</option></select>
  </form>
</body></html>"#;

    fn doc() -> MemoryDocument {
        MemoryDocument::parse(PAGE, "https://shop.test/products/mug?ref=home")
    }

    #[test]
    fn lookup_by_id_and_selector_agree() {
        let doc = doc();
        let by_id = doc.element_by_id("add-to-cart").unwrap();
        let by_sel = doc.query_selector("#product > button.primary").unwrap();
        assert_eq!(Some(by_id), by_sel);
        assert_eq!(doc.tag_name(by_id).as_deref(), Some("button"));
    }

    #[test]
    fn selector_misses_and_errors() {
        let doc = doc();
        assert_eq!(doc.query_selector("#nope").unwrap(), None);
        assert_matches!(doc.query_selector("div[["), Err(DomError::InvalidSelector { .. }));
    }

    #[test]
    fn query_all_in_document_order() {
        let doc = doc();
        let ids: Vec<_> = doc
            .query_selector_all("form > *")
            .unwrap()
            .into_iter()
            .filter_map(|n| doc.id(n))
            .collect();
        assert_eq!(ids, vec!["email", "note", "size"]);
    }

    #[test]
    fn structure_navigation() {
        let doc = doc();
        let button = doc.element_by_id("add-to-cart").unwrap();
        let card = doc.parent_element(button).unwrap();
        assert_eq!(doc.id(card).as_deref(), Some("product"));
        assert_eq!(doc.class(card).as_deref(), Some("card"));
        assert_eq!(doc.child_elements(card).len(), 3);
        assert_eq!(doc.sibling_texts(button, 5), vec!["Blue Mug", "$12"]);

        let tags: Vec<_> = doc
            .ancestors(button, 10)
            .into_iter()
            .filter_map(|n| doc.tag_name(n))
            .collect();
        assert_eq!(tags, vec!["div", "body", "html"]);
        assert_eq!(doc.body(), doc.ancestors(button, 2).get(1).copied());
    }

    #[test]
    fn form_values() {
        let doc = doc();
        let email = doc.element_by_id("email").unwrap();
        let note = doc.element_by_id("note").unwrap();
        let size = doc.element_by_id("size").unwrap();
        assert_eq!(doc.form_value(email).as_deref(), Some("a@b.test"));
        assert_eq!(doc.form_value(note).as_deref(), Some("gift wrap"));
        assert_eq!(doc.form_value(size).as_deref(), Some("m"));

        doc.set_form_value(email, "c@d.test").unwrap();
        assert_eq!(doc.form_value(email).as_deref(), Some("c@d.test"));

        let button = doc.element_by_id("add-to-cart").unwrap();
        assert_eq!(doc.form_value(button), None);
        assert_matches!(
            doc.set_form_value(button, "x"),
            Err(DomError::NotFormControl(_))
        );
    }

    #[test]
    fn outer_html_reflects_attributes() {
        let doc = doc();
        let button = doc.element_by_id("add-to-cart").unwrap();
        assert_eq!(
            doc.outer_html(button).as_deref(),
            Some(r#"<button id="add-to-cart" class="btn primary">Add to cart</button>"#)
        );
        let email = doc.element_by_id("email").unwrap();
        assert!(doc.outer_html(email).unwrap().ends_with('>'));
        assert!(!doc.outer_html(email).unwrap().contains("</input>"));
    }

    #[test]
    fn set_text_replaces_content() {
        let doc = doc();
        let price = doc.query_selector(".price").unwrap().unwrap();
        doc.set_text(price, "$10").unwrap();
        assert_eq!(doc.text_content(price).as_deref(), Some("$10"));
    }

    #[test]
    fn dispatch_and_navigate_are_recorded() {
        let doc = doc();
        let button = doc.element_by_id("add-to-cart").unwrap();
        doc.dispatch(button, DomEventKind::Click).unwrap();
        assert_eq!(
            doc.dispatched(),
            vec![DispatchedEvent {
                node: button,
                kind: DomEventKind::Click
            }]
        );

        doc.navigate("/cart", None).unwrap();
        assert_eq!(doc.location(), "https://shop.test/cart");

        doc.navigate("https://help.test/faq", Some("_blank")).unwrap();
        assert_eq!(doc.location(), "https://shop.test/cart");
        assert_eq!(doc.navigations().len(), 2);
        assert_eq!(doc.navigations()[1].target.as_deref(), Some("_blank"));

        assert_matches!(doc.navigate("  ", None), Err(DomError::Navigation(_)));
    }

    #[test]
    fn stale_handles_yield_nothing() {
        let doc = doc();
        let stale = NodeId(100_000);
        assert_eq!(doc.tag_name(stale), None);
        assert!(doc.attributes(stale).is_empty());
        assert_eq!(doc.parent_element(stale), None);
        assert_matches!(doc.dispatch(stale, DomEventKind::Click), Err(DomError::UnknownNode(_)));
    }

    #[test]
    fn relative_urls_resolve() {
        assert_eq!(resolve_url("https://a.test/x/y?q=1", "z"), "https://a.test/x/z");
        assert_eq!(resolve_url("https://a.test", "/p"), "https://a.test/p");
        assert_eq!(resolve_url("https://a.test/x", "https://b.test/"), "https://b.test/");
    }
}
