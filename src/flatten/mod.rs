//! Template flattening: every `instance_of` reference in the tree is replaced
//! by an independent deep copy of what it names.

pub mod geometry;

use itertools::Itertools;
use log::{debug, info};

use crate::ast::{Node, NodeId, NodeKind, Payload, Tree, Value};
use crate::error::{CompileError, Warning, Warnings};

pub use geometry::{derive_volume, GEOMETRY_KEYS};

fn reference_error(
    tree: &Tree,
    what: &'static str,
    site: NodeId,
    id: &str,
    found: usize,
) -> CompileError {
    let scope = tree
        .get(site)
        .parent()
        .map(|p| tree.path(p))
        .unwrap_or_else(|| tree.path(site));
    CompileError::Reference {
        what,
        id: id.to_string(),
        scope,
        found,
        span: tree.get(site).span,
    }
}

fn instance_of(tree: &Tree, site: NodeId) -> Option<String> {
    tree.get(site).attr("instance_of").map(|s| s.to_string())
}

/// the unique top level node of `kind` called `id`
fn find_global(
    tree: &Tree,
    kind: NodeKind,
    what: &'static str,
    site: NodeId,
    id: &str,
) -> Result<NodeId, CompileError> {
    let matches: Vec<NodeId> = tree
        .children(tree.root())
        .iter()
        .copied()
        .filter(|c| tree.get(*c).kind == kind && tree.get(*c).name == id)
        .collect();
    match matches.as_slice() {
        [found] => Ok(*found),
        _ => Err(reference_error(tree, what, site, id, matches.len())),
    }
}

/// Reaction declaration `id` as seen from `site`: the first enclosing scope
/// declaring it must declare it exactly once.
fn find_reaction_declaration(
    tree: &Tree,
    site: NodeId,
    id: &str,
) -> Result<NodeId, CompileError> {
    for scope in tree.ancestors(site) {
        let matches = tree
            .children(scope)
            .iter()
            .copied()
            .filter(|c| {
                tree.get(*c).kind == NodeKind::ReactionDeclaration && tree.get(*c).name == id
            })
            .collect::<Vec<_>>();
        match matches.len() {
            0 => continue,
            1 => return Ok(matches[0]),
            n => return Err(reference_error(tree, "reaction", site, id, n)),
        }
    }
    Err(reference_error(tree, "reaction", site, id, 0))
}

fn has_value(tree: &Tree, id: NodeId, name: &str) -> bool {
    tree.find_child(id, NodeKind::Parameter, name).is_some()
        || tree.find_child(id, NodeKind::Variable, name).is_some()
}

/// Give a reaction without a rate a zero one, with a warning.
fn default_rates(tree: &mut Tree, reaction: NodeId, warnings: &mut Warnings) {
    let required: &[&[&str]] = match tree.get(reaction).attr("type") {
        Some("enz_reac") => &[&["km"], &["kcat"]],
        _ => &[&["kf", "numKf"], &["kb", "numKb"]],
    };
    for alternatives in required {
        if alternatives.iter().any(|k| has_value(tree, reaction, k)) {
            continue;
        }
        let key = alternatives[0];
        let span = tree.get(reaction).span;
        warnings.push(Warning::new(
            format!(
                "reaction {} has no {}, using 0.0",
                tree.path(reaction),
                alternatives.join(" or ")
            ),
            span,
        ));
        tree.push(
            reaction,
            Node::new(NodeKind::Parameter, key, span)
                .with_payload(Payload::Value(Value::number(0.0))),
        );
    }
}

/// Copy the parameters of the referenced declaration into every reaction
/// instance directly under `scope`.
fn flatten_reactions(
    tree: &mut Tree,
    scope: NodeId,
    warnings: &mut Warnings,
) -> Result<(), CompileError> {
    for reaction in tree.children_of_kind(scope, NodeKind::ReactionInstance) {
        if let Some(id) = instance_of(tree, reaction) {
            let decl = find_reaction_declaration(tree, reaction, &id)?;
            for value in tree.value_children(decl) {
                let copy = tree.deep_copy(value);
                tree.attach(reaction, copy);
            }
            let reaction_type = tree.get(decl).attr("type").unwrap_or("reaction").to_string();
            let node = tree.get_mut(reaction);
            node.attrs.remove("instance_of");
            node.attrs.insert("type".to_string(), reaction_type);
            debug!("resolved reaction {} to {}", tree.path(reaction), id);
        }
        default_rates(tree, reaction, warnings);
    }
    Ok(())
}

/// Replace every recipe instance directly under `scope` by a
/// `ChemicalSubnetwork` holding a copy of the recipe body. `stack` holds the
/// recipes being expanded, to catch a recipe instantiating itself.
fn flatten_recipes(
    tree: &mut Tree,
    scope: NodeId,
    stack: &mut Vec<String>,
) -> Result<(), CompileError> {
    for site in tree.children_of_kind(scope, NodeKind::RecipeInstance) {
        let id = instance_of(tree, site).unwrap_or_default();
        let recipe = find_global(tree, NodeKind::Recipe, "recipe", site, &id)?;
        if stack.contains(&id) {
            stack.push(id);
            return Err(CompileError::Shape {
                message: format!("recursive recipe instantiation {}", stack.iter().join(" -> ")),
                scope: tree.path(scope),
                span: tree.get(site).span,
            });
        }
        let name = tree.get(site).name.clone();
        let span = tree.get(site).span;
        let subnetwork = tree.alloc(
            Node::new(NodeKind::ChemicalSubnetwork, &name, span).with_attr("type", &id),
        );
        for child in tree.children(recipe).to_vec() {
            let copy = tree.deep_copy(child);
            tree.attach(subnetwork, copy);
        }
        tree.replace(site, subnetwork);
        stack.push(id);
        flatten_recipes(tree, subnetwork, stack)?;
        stack.pop();
        debug!("expanded recipe instance {}", tree.path(subnetwork));
    }
    Ok(())
}

/// Apply the value children of a compartment instance to the copied
/// compartment, replacing same-named values or appending new ones.
fn apply_overrides(tree: &mut Tree, instance: NodeId, compartment: NodeId) -> bool {
    let geometry = tree.children_of_kind(compartment, NodeKind::Geometry);
    let mut geometry_changed = false;
    for value in tree.value_children(instance) {
        let name = tree.get(value).name.clone();
        let target = geometry
            .iter()
            .chain(std::iter::once(&compartment))
            .find_map(|scope| {
                tree.value_children(*scope)
                    .into_iter()
                    .find(|c| tree.get(*c).name == name)
                    .map(|c| (c, *scope != compartment))
            });
        match target {
            Some((target, in_geometry)) => {
                let payload = tree.get(value).payload.clone();
                let span = tree.get(value).span;
                let node = tree.get_mut(target);
                node.payload = payload;
                node.span = span;
                node.attrs.remove("derived");
                geometry_changed |= in_geometry;
            }
            None => {
                let copy = tree.deep_copy(value);
                match geometry.first() {
                    Some(g) if GEOMETRY_KEYS.contains(&name.as_str()) => {
                        tree.attach(*g, copy);
                        geometry_changed = true;
                    }
                    _ => tree.attach(compartment, copy),
                }
            }
        }
        debug!("override {} in {}", name, tree.path(compartment));
    }
    geometry_changed
}

/// Replace every compartment instance of `model` by a copy of its compartment.
fn flatten_compartments(
    tree: &mut Tree,
    model: NodeId,
    warnings: &mut Warnings,
) -> Result<(), CompileError> {
    for instance in tree.children_of_kind(model, NodeKind::CompartmentInstance) {
        let id = instance_of(tree, instance).unwrap_or_default();
        let compartment = find_global(tree, NodeKind::Compartment, "compartment", instance, &id)?;
        let copy = tree.deep_copy(compartment);
        let instance_node = tree.get(instance).clone();
        {
            let node = tree.get_mut(copy);
            node.name = instance_node.name.clone();
            node.span = instance_node.span;
            node.attrs.insert("type".to_string(), id.clone());
            if let Some(nature) = instance_node.attr("nature") {
                node.attrs.insert("nature".to_string(), nature.to_string());
            }
        }
        if apply_overrides(tree, instance, copy) {
            for geometry in tree.children_of_kind(copy, NodeKind::Geometry) {
                geometry::clear_derived_volume(tree, geometry);
                derive_volume(tree, geometry, warnings);
            }
        }
        tree.replace(instance, copy);
        debug!("instantiated compartment {} as {}", id, tree.path(copy));
    }
    Ok(())
}

/// Resolve every reference in `tree`: reaction declarations, then recipes,
/// then compartment instances of the model. Geometry volumes are derived
/// along the way.
pub fn flatten(tree: &mut Tree, warnings: &mut Warnings) -> Result<(), CompileError> {
    let root = tree.root();

    for recipe in tree.children_of_kind(root, NodeKind::Recipe) {
        flatten_reactions(tree, recipe, warnings)?;
    }
    for recipe in tree.children_of_kind(root, NodeKind::Recipe) {
        let mut stack = vec![tree.get(recipe).name.clone()];
        flatten_recipes(tree, recipe, &mut stack)?;
    }
    for compartment in tree.children_of_kind(root, NodeKind::Compartment) {
        flatten_reactions(tree, compartment, warnings)?;
        flatten_recipes(tree, compartment, &mut Vec::new())?;
        for geometry in tree.children_of_kind(compartment, NodeKind::Geometry) {
            derive_volume(tree, geometry, warnings);
        }
    }
    for model in tree.children_of_kind(root, NodeKind::Model) {
        flatten_compartments(tree, model, warnings)?;
    }

    info!(
        "flattened tree has {} reachable nodes",
        tree.descendants(root).len()
    );
    Ok(())
}
