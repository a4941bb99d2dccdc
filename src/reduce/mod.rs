//! Compile time evaluation of `Parameter` and `Variable` expressions.
//!
//! Scopes are reduced outer first. Inside a scope the values are visited in
//! dependency order, every reference to an already reduced value is replaced
//! by its number and the result evaluated. Whatever cannot be evaluated (the
//! time `t`, runtime symbols) is kept as a residual expression.

pub mod graph;

use std::collections::HashMap;

use itertools::Itertools;
use log::{debug, info};

use crate::ast::{EvalError, NodeId, NodeKind, StringSpan, Tree, Value, TIME_SYMBOL};
use crate::error::{CompileError, Warning, Warnings};

pub use graph::DependencyGraph;

/// Evaluation problems keyed by source position and message. Copies of one
/// template share both, so each problem becomes one warning listing every
/// path it was met at.
#[derive(Default)]
struct Problems {
    index: HashMap<(Option<StringSpan>, String), usize>,
    found: Vec<(Option<StringSpan>, String, Vec<String>)>,
}

impl Problems {
    fn record(&mut self, span: Option<StringSpan>, message: String, path: String) {
        let found = &mut self.found;
        let i = *self.index.entry((span, message.clone())).or_insert_with(|| {
            found.push((span, message, Vec::new()));
            found.len() - 1
        });
        if !self.found[i].2.contains(&path) {
            self.found[i].2.push(path);
        }
    }

    fn into_warnings(self, warnings: &mut Warnings) {
        for (span, message, paths) in self.found {
            warnings.push(Warning::new(
                format!("{} (in {})", message, paths.iter().join(", ")),
                span,
            ));
        }
    }
}

/// what a name resolves to: `Some` literal, or `None` for a declared value
/// that is not reduced
type Binding = Option<f64>;

fn is_scope(kind: NodeKind) -> bool {
    !kind.is_value() && kind != NodeKind::Geometry
}

/// values declared by `scope`, including those of its geometry
fn scope_values(tree: &Tree, scope: NodeId) -> Vec<NodeId> {
    let mut values = tree.value_children(scope);
    for geometry in tree.children_of_kind(scope, NodeKind::Geometry) {
        values.extend(tree.value_children(geometry));
    }
    values
}

fn binding(tree: &Tree, id: NodeId) -> Binding {
    tree.value(id).and_then(|v| v.as_number())
}

/// Resolve `name` in the scopes enclosing `scope`, innermost first.
fn lookup_outer(tree: &Tree, scope: NodeId, name: &str) -> Option<Binding> {
    tree.ancestors(scope).into_iter().find_map(|s| {
        scope_values(tree, s)
            .into_iter()
            .find(|v| tree.get(*v).name == name)
            .map(|v| binding(tree, v))
    })
}

struct Scope {
    id: NodeId,
    values: Vec<NodeId>,
    /// first declaration of each name
    local: HashMap<String, NodeId>,
    outer: HashMap<String, Binding>,
}

impl Scope {
    fn new(tree: &Tree, id: NodeId) -> Self {
        let values = scope_values(tree, id);
        let mut local = HashMap::new();
        for v in values.iter() {
            local.entry(tree.get(*v).name.clone()).or_insert(*v);
        }
        let mut outer = HashMap::new();
        for v in values.iter() {
            if let Some(expr) = tree.value(*v).and_then(|v| v.expr.as_ref()) {
                for name in expr.get_dependents() {
                    let is_local = local.get(name).is_some_and(|l| l != v);
                    if name == TIME_SYMBOL || is_local || outer.contains_key(name) {
                        continue;
                    }
                    if let Some(b) = lookup_outer(tree, id, name) {
                        outer.insert(name.to_string(), b);
                    }
                }
            }
        }
        Self {
            id,
            values,
            local,
            outer,
        }
    }

    /// Binding of `name` seen from the value `id`. A value naming itself
    /// refers to the enclosing scopes.
    fn resolve(&self, tree: &Tree, id: NodeId, name: &str) -> Option<Binding> {
        match self.local.get(name) {
            Some(v) if *v != id => Some(binding(tree, *v)),
            _ => self.outer.get(name).copied(),
        }
    }

    fn cycle(&self, tree: &Tree, names: Vec<String>) -> CompileError {
        let span = names.first().and_then(|first| {
            self.values
                .iter()
                .find(|v| tree.get(**v).name == *first)
                .and_then(|v| tree.get(*v).span)
        });
        CompileError::Cycle {
            scope: tree.path(self.id),
            names,
            span,
        }
    }

    fn graph(&self, tree: &Tree) -> Result<Vec<NodeId>, CompileError> {
        let index: HashMap<NodeId, usize> =
            self.values.iter().enumerate().map(|(i, v)| (*v, i)).collect();
        let mut graph =
            DependencyGraph::new(self.values.iter().map(|v| tree.get(*v).name.as_str()).collect());
        for (i, v) in self.values.iter().enumerate() {
            if let Some(expr) = tree.value(*v).and_then(|v| v.expr.as_ref()) {
                for name in expr.get_dependents() {
                    if name == TIME_SYMBOL {
                        continue;
                    }
                    match self.local.get(name) {
                        Some(dep) if dep != v => graph.add_edge(i, index[dep]),
                        _ => (),
                    }
                }
            }
        }
        let order = graph.order().map_err(|names| self.cycle(tree, names))?;
        Ok(order.into_iter().map(|i| self.values[i]).collect())
    }
}

/// Try to reduce one value, returns whether it changed.
fn reduce_value(
    tree: &mut Tree,
    scope: &Scope,
    id: NodeId,
    problems: &mut Problems,
) -> bool {
    let value = match tree.value(id) {
        Some(v) if !v.is_reduced => v.clone(),
        _ => return false,
    };
    let mut expr = match value.expr {
        Some(expr) => expr,
        None => {
            problems.record(
                tree.get(id).span,
                format!("`{}` is not an arithmetic expression, left as text", value.text),
                tree.path(id),
            );
            return false;
        }
    };

    let mut replacements = HashMap::new();
    let mut shadowed_pi = false;
    for name in expr.get_dependents() {
        if name == TIME_SYMBOL {
            continue;
        }
        match scope.resolve(tree, id, name) {
            Some(Some(v)) => {
                replacements.insert(name.to_string(), v);
            }
            Some(None) => shadowed_pi |= name == "pi",
            None => (),
        }
    }
    let substituted = expr.substitute(&replacements);

    let result = if shadowed_pi {
        Err(EvalError::Unbound("pi".to_string()))
    } else {
        expr.eval()
    };
    match result {
        Ok(number) => {
            debug!("reduced {} = {}", tree.path(id), number);
            if let Some(v) = tree.value_mut(id) {
                *v = Value::number(number);
            }
            true
        }
        Err(err) => {
            if !matches!(err, EvalError::Unbound(_)) {
                problems.record(
                    tree.get(id).span,
                    format!("cannot evaluate `{}`: {}", value.text, err),
                    tree.path(id),
                );
                return false;
            }
            if substituted == 0 {
                debug!("{} = `{}` left unreduced: {}", tree.path(id), value.text, err);
                return false;
            }
            if !shadowed_pi {
                expr.fold_constants();
            }
            let text = expr.to_string();
            debug!("{} = `{}` partially reduced", tree.path(id), text);
            match tree.value_mut(id) {
                Some(residual) if residual.text != text => {
                    residual.text = text;
                    residual.expr = Some(expr);
                    true
                }
                _ => false,
            }
        }
    }
}

fn reduce_scope(tree: &mut Tree, id: NodeId, problems: &mut Problems) -> Result<(), CompileError> {
    let scope = Scope::new(tree, id);
    if scope.values.is_empty() {
        return Ok(());
    }
    let order = scope.graph(tree)?;
    let max_passes = scope.values.len() + 1;
    let mut passes = 0;
    loop {
        passes += 1;
        if passes > max_passes {
            let names = order
                .iter()
                .filter(|v| !tree.value(**v).map_or(true, |v| v.is_reduced))
                .map(|v| tree.get(*v).name.clone())
                .collect();
            return Err(scope.cycle(tree, names));
        }
        let mut changed = false;
        for v in order.iter() {
            changed |= reduce_value(tree, &scope, *v, problems);
        }
        if !changed {
            break;
        }
    }
    debug!("reduced {} in {} passes", tree.path(id), passes);
    Ok(())
}

/// Reduce every value reachable from the root. Running it again on its own
/// output changes nothing.
pub fn reduce(tree: &mut Tree, warnings: &mut Warnings) -> Result<(), CompileError> {
    let mut problems = Problems::default();
    let scopes: Vec<NodeId> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|n| is_scope(tree.get(*n).kind))
        .collect();
    for scope in scopes.iter() {
        reduce_scope(tree, *scope, &mut problems)?;
    }
    problems.into_warnings(warnings);
    let (reduced, total) = tree
        .descendants(tree.root())
        .into_iter()
        .filter_map(|n| tree.value(n))
        .fold((0, 0), |(r, t), v| (r + v.is_reduced as usize, t + 1));
    info!("reduced {} of {} values", reduced, total);
    Ok(())
}
