use crate::io::gml::names::{Attribute, QName};

/// A node below a feature element.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element(MarkupElement),
    Text(String),
}

/// A feature or property element with its content.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupElement {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub children: Vec<MarkupNode>,
}

impl MarkupElement {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: vec![],
            children: vec![],
        }
    }

    pub fn with_attribute(mut self, name: QName, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn with_child(mut self, child: MarkupElement) -> Self {
        self.children.push(MarkupNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(MarkupNode::Text(text.into()));
        self
    }
}
