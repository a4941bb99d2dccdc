use std::collections::BTreeMap;
use std::fmt;

use super::expr::{canonical_number, Expr};
use crate::parser::parse_expr_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringSpan {
    pub pos_start: usize,
    pub pos_end: usize,
}

impl fmt::Display for StringSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.pos_start, self.pos_end)
    }
}

/// index of a node in its [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Program,
    Recipe,
    Compartment,
    Geometry,
    Species,
    ReactionDeclaration,
    ReactionInstance,
    RecipeInstance,
    Variable,
    Parameter,
    CompartmentInstance,
    Simulator,
    Model,
    ChemicalSubnetwork,
}

impl NodeKind {
    /// element name used when the tree is emitted
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Program => "yacml",
            NodeKind::Recipe => "recipe",
            NodeKind::Compartment => "compartment",
            NodeKind::Geometry => "geometry",
            NodeKind::Species => "species",
            NodeKind::ReactionDeclaration => "reaction_declaration",
            NodeKind::ReactionInstance => "reaction",
            NodeKind::RecipeInstance => "recipe_instance",
            NodeKind::Variable => "variable",
            NodeKind::Parameter => "parameter",
            NodeKind::CompartmentInstance => "compartment_instance",
            NodeKind::Simulator => "simulator",
            NodeKind::Model => "model",
            NodeKind::ChemicalSubnetwork => "chemical_reaction_subnetwork",
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, NodeKind::Variable | NodeKind::Parameter)
    }

    /// templates and declarations are named by `id`, everything else by `name`
    pub fn is_declaration(&self) -> bool {
        matches!(self, NodeKind::Recipe | NodeKind::ReactionDeclaration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reactant {
    pub stoichiometry: u32,
    pub species: String,
}

impl fmt::Display for Reactant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.stoichiometry == 1 {
            write!(f, "{}", self.species)
        } else {
            write!(f, "{}{}", self.stoichiometry, self.species)
        }
    }
}

/// the expression held by a `Parameter` or `Variable`
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub text: String,
    pub is_reduced: bool,
    /// `None` when `text` is not valid arithmetic
    pub expr: Option<Expr>,
}

impl Value {
    pub fn number(value: f64) -> Self {
        Self {
            text: canonical_number(value),
            is_reduced: true,
            expr: Some(Expr::Number(value)),
        }
    }

    pub fn from_text(text: &str) -> Self {
        let expr = parse_expr_string(text).ok();
        match expr.as_ref().and_then(|e| e.as_number()) {
            Some(v) => Self::number(v),
            None => Self {
                text: text.trim().to_string(),
                is_reduced: false,
                expr,
            },
        }
    }

    pub fn from_expr(expr: Expr) -> Self {
        match expr.as_number() {
            Some(v) => Self::number(v),
            None => Self {
                text: expr.to_string(),
                is_reduced: false,
                expr: Some(expr),
            },
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        if self.is_reduced {
            self.expr.as_ref().and_then(|e| e.as_number())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Value(Value),
    Reaction {
        substrates: Vec<Reactant>,
        products: Vec<Reactant>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub payload: Payload,
    pub span: Option<StringSpan>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind, name: &str, span: Option<StringSpan>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            attrs: BTreeMap::new(),
            payload: Payload::Empty,
            span,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    pub fn children(&self) -> &[NodeId] {
        self.children.as_slice()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn as_value(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_value_mut(&mut self) -> Option<&mut Value> {
        match &mut self.payload {
            Payload::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn reactants(&self) -> Option<(&[Reactant], &[Reactant])> {
        match &self.payload {
            Payload::Reaction {
                substrates,
                products,
            } => Some((substrates, products)),
            _ => None,
        }
    }
}

/// Arena holding every node of one compilation. Nodes are never freed, a
/// replaced or detached node simply becomes unreachable from the root.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Program, "yacml", None)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// number of allocated slots, reachable or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).children()
    }

    pub fn value(&self, id: NodeId) -> Option<&Value> {
        self.get(id).as_value()
    }

    pub fn value_mut(&mut self, id: NodeId) -> Option<&mut Value> {
        self.get_mut(id).as_value_mut()
    }

    /// allocate a detached node
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// allocate a node as the last child of `parent`
    pub fn push(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.alloc(node);
        self.attach(parent, id);
        id
    }

    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// put `new` at the position `old` occupies in its parent, detaching `old`
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        self.detach(new);
        if let Some(parent) = self.nodes[old.0].parent.take() {
            let children = &mut self.nodes[parent.0].children;
            if let Some(pos) = children.iter().position(|c| *c == old) {
                children[pos] = new;
            }
            self.nodes[new.0].parent = Some(parent);
        }
    }

    /// Copy the subtree rooted at `id` into fresh slots. The copy is detached
    /// and shares no node with the original.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let mut node = self.nodes[id.0].clone();
        let children = std::mem::take(&mut node.children);
        node.parent = None;
        let copy = self.alloc(node);
        for child in children {
            let child_copy = self.deep_copy(child);
            self.attach(copy, child_copy);
        }
        copy
    }

    pub fn children_of_kind(&self, id: NodeId, kind: NodeKind) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.get(*c).kind == kind)
            .collect()
    }

    pub fn find_child(&self, id: NodeId, kind: NodeKind, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.get(*c).kind == kind && self.get(*c).name == name)
    }

    /// `Parameter` and `Variable` children of `id`
    pub fn value_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.get(*c).kind.is_value())
            .collect()
    }

    /// parent, grandparent, ... up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ret = Vec::new();
        let mut current = self.get(id).parent;
        while let Some(p) = current {
            ret.push(p);
            current = self.get(p).parent;
        }
        ret
    }

    /// every node reachable from `id`, in pre-order, including `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut ret = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            ret.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        ret
    }

    /// slash separated names from the root, used in diagnostics
    pub fn path(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = self
            .ancestors(id)
            .into_iter()
            .filter(|a| *a != self.root)
            .map(|a| self.get(a).name.as_str())
            .collect();
        names.reverse();
        if id != self.root {
            names.push(self.get(id).name.as_str());
        }
        format!("/{}", names.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, NodeKind, Payload, Tree, Value};

    fn recipe_tree() -> (Tree, super::NodeId) {
        let mut tree = Tree::new();
        let root = tree.root();
        let recipe = tree.push(root, Node::new(NodeKind::Recipe, "R", None));
        let species = tree.push(recipe, Node::new(NodeKind::Species, "a", None));
        tree.push(
            species,
            Node::new(NodeKind::Parameter, "conc_init", None)
                .with_payload(Payload::Value(Value::from_text("k * 2"))),
        );
        (tree, recipe)
    }

    #[test]
    fn deep_copy_is_disjoint() {
        let (mut tree, recipe) = recipe_tree();
        let copy = tree.deep_copy(recipe);
        let original_nodes = tree.descendants(recipe);
        let copied_nodes = tree.descendants(copy);
        assert_eq!(original_nodes.len(), copied_nodes.len());
        assert!(copied_nodes.iter().all(|c| !original_nodes.contains(c)));

        let copied_param = *copied_nodes.last().unwrap();
        *tree.value_mut(copied_param).unwrap() = Value::number(3.0);
        let original_param = *original_nodes.last().unwrap();
        assert!(!tree.value(original_param).unwrap().is_reduced);
        assert_eq!(tree.value(original_param).unwrap().text, "k * 2");
    }

    #[test]
    fn replace_keeps_position() {
        let (mut tree, recipe) = recipe_tree();
        let root = tree.root();
        let last = tree.push(root, Node::new(NodeKind::Model, "m", None));
        let copy = tree.deep_copy(recipe);
        tree.get_mut(copy).name = "R2".to_string();
        tree.replace(recipe, copy);
        assert_eq!(tree.children(root), &[copy, last]);
        assert_eq!(tree.get(copy).parent(), Some(root));
        assert_eq!(tree.get(recipe).parent(), None);
    }

    #[test]
    fn paths() {
        let (tree, recipe) = recipe_tree();
        let species = tree.children(recipe)[0];
        assert_eq!(tree.path(species), "/R/a");
        assert_eq!(tree.path(tree.root()), "/");
    }

    #[test]
    fn value_from_text() {
        let v = Value::from_text("4.0");
        assert!(v.is_reduced);
        assert_eq!(v.as_number(), Some(4.0));
        let v = Value::from_text("2.9*x");
        assert!(!v.is_reduced);
        assert_eq!(v.text, "2.9*x");
        let v = Value::from_text("2.9 * (x");
        assert!(v.expr.is_none());
        let v = Value::from_text("1e400");
        assert!(!v.is_reduced);
        assert!(v.expr.is_none());
        assert_eq!(v.text, "1e400");
    }
}
