use std::collections::BTreeMap;

/// Owned snapshot of a DOM element and its subtree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// Text directly inside this element, excluding children.
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All text in the subtree, whitespace-collapsed.
    pub fn inner_text(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        if !self.text.trim().is_empty() {
            parts.push(self.text.trim());
        }
        for child in &self.children {
            child.collect_text(parts);
        }
    }

    /// Descendants (not including `self`) with the given tag, in document order.
    pub fn descendants_by_tag(&self, tag: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        for child in &self.children {
            child.walk_tag(tag, &mut found);
        }
        found
    }

    fn walk_tag<'a>(&'a self, tag: &str, found: &mut Vec<&'a Element>) {
        if self.tag.eq_ignore_ascii_case(tag) {
            found.push(self);
        }
        for child in &self.children {
            child.walk_tag(tag, found);
        }
    }
}
