//! Qualified names and namespace bookkeeping.

use std::borrow::Cow;
use std::fmt::Display;

use indexmap::IndexMap;

pub const GML_NAMESPACE: &str = "http://www.opengis.net/gml/3.2";
pub const WFS_NAMESPACE: &str = "http://www.opengis.net/wfs/2.0";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// An element or attribute name with an optional namespace URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: Option<String>,
    pub local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local_name: local_name.into(),
        }
    }

    /// A name without namespace.
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    pub fn gml(local_name: impl Into<String>) -> Self {
        Self::new(GML_NAMESPACE, local_name)
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name == local_name
    }
}

impl Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{{{namespace}}}{}", self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Prefixes registered for namespace URIs, declared once on the document root.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespaces {
    // uri -> prefix
    prefixes: IndexMap<String, String>,
}

impl Namespaces {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            prefixes: IndexMap::new(),
        }
    }

    pub fn with(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.insert(prefix, uri);
        self
    }

    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.insert(uri.into(), prefix.into());
    }

    pub fn prefix(&self, uri: &str) -> Option<&str> {
        self.prefixes.get(uri).map(String::as_str)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.prefixes.contains_key(uri)
    }

    /// `(prefix, uri)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes
            .iter()
            .map(|(uri, prefix)| (prefix.as_str(), uri.as_str()))
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new()
            .with("wfs", WFS_NAMESPACE)
            .with("gml", GML_NAMESPACE)
            .with("xlink", XLINK_NAMESPACE)
            .with("xsi", XSI_NAMESPACE)
    }
}

fn escape(value: &str, escape_quotes: bool) -> Cow<'_, str> {
    let needs_escape = |c: char| matches!(c, '&' | '<' | '>') || (escape_quotes && c == '"');
    if !value.contains(needs_escape) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if escape_quotes => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

pub(crate) fn escape_text(value: &str) -> Cow<'_, str> {
    escape(value, false)
}

pub(crate) fn escape_attribute(value: &str) -> Cow<'_, str> {
    escape(value, true)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_prefixes() {
        let namespaces = Namespaces::default();
        assert_eq!(namespaces.prefix(GML_NAMESPACE), Some("gml"));
        assert!(!namespaces.contains(ATOM_NAMESPACE));
        let prefixes: Vec<_> = namespaces.iter().map(|(prefix, _)| prefix).collect();
        assert_eq!(prefixes, ["wfs", "gml", "xlink", "xsi"]);
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_text("say \"hi\""), "say \"hi\"");
        assert_eq!(escape_attribute("say \"hi\""), "say &quot;hi&quot;");
        assert!(matches!(escape_text("plain"), Cow::Borrowed(_)));
    }
}
