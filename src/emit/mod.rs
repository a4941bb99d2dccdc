use std::fmt::{self, Write};

use serde::Serialize;

use crate::ast::{NodeId, NodeKind, Payload, Reactant, Tree};

/// One element of the emitted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// first child with the given tag and `name` (or `id`) attribute
    pub fn child(&self, tag: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| {
            c.tag == tag && (c.attribute("name") == Some(name) || c.attribute("id") == Some(name))
        })
    }

    pub fn children_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn to_xml(&self) -> String {
        let mut buf = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        // writing into a String cannot fail
        let _ = self.write_xml(&mut buf, 0);
        buf
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn write_xml(&self, f: &mut String, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{}<{}", indent, self.tag)?;
        for (key, value) in self.attributes.iter() {
            write!(f, " {}=\"{}\"", key, escape(value))?;
        }
        match (&self.text, self.children.is_empty()) {
            (None, true) => writeln!(f, "/>"),
            (Some(text), true) => writeln!(f, ">{}</{}>", escape(text), self.tag),
            (text, false) => {
                writeln!(f, ">")?;
                if let Some(text) = text {
                    writeln!(f, "{}  {}", indent, escape(text))?;
                }
                for child in self.children.iter() {
                    child.write_xml(f, depth + 1)?;
                }
                writeln!(f, "{}</{}>", indent, self.tag)
            }
        }
    }
}

fn escape(text: &str) -> String {
    let mut ret = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => ret.push_str("&amp;"),
            '<' => ret.push_str("&lt;"),
            '>' => ret.push_str("&gt;"),
            '"' => ret.push_str("&quot;"),
            '\'' => ret.push_str("&apos;"),
            _ => ret.push(c),
        }
    }
    ret
}

fn reactant(tag: &str, r: &Reactant) -> Element {
    let mut element = Element::new(tag);
    element
        .attributes
        .push(("stoichiometry".to_string(), r.stoichiometry.to_string()));
    element.text = Some(r.species.clone());
    element
}

fn emit_node(tree: &Tree, id: NodeId) -> Element {
    let node = tree.get(id);
    let mut element = Element::new(node.kind.tag());
    match node.kind {
        NodeKind::Program | NodeKind::Geometry => (),
        kind if kind.is_declaration() => {
            element.attributes.push(("id".to_string(), node.name.clone()))
        }
        _ => element.attributes.push(("name".to_string(), node.name.clone())),
    }
    element.attributes.extend(
        node.attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    match &node.payload {
        Payload::Empty => (),
        Payload::Value(value) => {
            element
                .attributes
                .push(("is_reduced".to_string(), value.is_reduced.to_string()));
            element.text = Some(value.text.clone());
        }
        Payload::Reaction {
            substrates,
            products,
        } => {
            element
                .children
                .extend(substrates.iter().map(|r| reactant("substrate", r)));
            element
                .children
                .extend(products.iter().map(|r| reactant("product", r)));
        }
    }
    element
        .children
        .extend(node.children().iter().map(|c| emit_node(tree, *c)));
    element
}

/// Convert the tree under the root into an [`Element`] document.
pub fn emit(tree: &Tree) -> Element {
    emit_node(tree, tree.root())
}
