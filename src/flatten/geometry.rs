use std::collections::HashMap;
use std::f64::consts::PI;

use log::debug;

use crate::ast::{BinaryOp, Expr, Node, NodeId, NodeKind, Payload, Tree, Value};
use crate::error::{Warning, Warnings};

/// keys that size a geometry, instance overrides of these land on the geometry node
pub const GEOMETRY_KEYS: &[&str] = &[
    "volume",
    "radius",
    "r0",
    "r1",
    "length",
    "side",
    "dx",
    "dy",
    "dz",
    "head_radius",
    "shaft_radius",
    "shaft_length",
];

fn num(v: f64) -> Expr {
    Expr::Number(v)
}

fn name(n: &str) -> Expr {
    Expr::Name(n.to_string())
}

fn binop(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binop {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn mul(left: Expr, right: Expr) -> Expr {
    binop(BinaryOp::Mul, left, right)
}

fn add(left: Expr, right: Expr) -> Expr {
    binop(BinaryOp::Add, left, right)
}

fn pow(base: Expr, exponent: f64) -> Expr {
    binop(BinaryOp::Pow, base, num(exponent))
}

// pi * r^2 * length
fn cylinder(r: &str, length: &str) -> Expr {
    mul(mul(num(PI), pow(name(r), 2.0)), name(length))
}

/// Volume of a geometry as an expression over its dimension names, `None` if
/// the dimensions given are not enough to size the shape.
fn volume_formula(shape: &str, has: impl Fn(&str) -> bool) -> Option<Expr> {
    match shape {
        "cube" if has("side") => Some(pow(name("side"), 3.0)),
        "cube" if has("dx") && has("dy") && has("dz") => {
            Some(mul(mul(name("dx"), name("dy")), name("dz")))
        }
        // frustum: pi * length * (r0^2 + r0*r1 + r1^2) / 3
        "cylinder" if has("r0") && has("r1") && has("length") => Some(binop(
            BinaryOp::Div,
            mul(
                mul(num(PI), name("length")),
                add(
                    add(pow(name("r0"), 2.0), mul(name("r0"), name("r1"))),
                    pow(name("r1"), 2.0),
                ),
            ),
            num(3.0),
        )),
        "cylinder" if has("radius") && has("length") => Some(cylinder("radius", "length")),
        "cylinder" if has("r0") && has("length") => Some(cylinder("r0", "length")),
        "spine" if has("head_radius") => {
            let head = mul(num(4.0 / 3.0 * PI), pow(name("head_radius"), 3.0));
            if has("shaft_radius") && has("shaft_length") {
                Some(add(head, cylinder("shaft_radius", "shaft_length")))
            } else {
                Some(head)
            }
        }
        _ => None,
    }
}

/// Add a `volume` parameter to `geometry` if it has none. Literal dimensions
/// give a reduced number, otherwise the volume is left for the reducer as an
/// expression over the dimension names.
pub fn derive_volume(tree: &mut Tree, geometry: NodeId, warnings: &mut Warnings) {
    if tree
        .find_child(geometry, NodeKind::Parameter, "volume")
        .is_some()
    {
        return;
    }
    let shape = tree.get(geometry).attr("shape").unwrap_or_default().to_string();
    let dims: HashMap<String, &Value> = tree
        .value_children(geometry)
        .into_iter()
        .filter_map(|id| {
            let node = tree.get(id);
            node.as_value().map(|v| (node.name.clone(), v))
        })
        .collect();
    let formula = volume_formula(&shape, |d| dims.contains_key(d));
    let span = tree.get(geometry).span;
    let mut formula = match formula {
        Some(f) => f,
        None => {
            warnings.push(Warning::new(
                format!(
                    "cannot derive the volume of {} geometry in {}",
                    shape,
                    tree.path(geometry)
                ),
                span,
            ));
            return;
        }
    };
    if formula
        .get_dependents()
        .iter()
        .any(|d| dims.get(*d).map_or(true, |v| v.expr.is_none()))
    {
        warnings.push(Warning::new(
            format!(
                "cannot derive the volume of {} geometry in {}, a dimension is not arithmetic",
                shape,
                tree.path(geometry)
            ),
            span,
        ));
        return;
    }
    let literals: HashMap<String, f64> = dims
        .iter()
        .filter_map(|(k, v)| v.as_number().map(|n| (k.clone(), n)))
        .collect();
    if formula.substitute(&literals) > 0 {
        formula.fold_constants();
    }
    let value = Value::from_expr(formula);
    debug!(
        "derived volume {} for {}",
        value.text,
        tree.path(geometry)
    );
    let node = Node::new(NodeKind::Parameter, "volume", span)
        .with_attr("derived", "true")
        .with_payload(Payload::Value(value));
    tree.push(geometry, node);
}

/// drop a volume added by [`derive_volume`] so it can be derived again
pub fn clear_derived_volume(tree: &mut Tree, geometry: NodeId) {
    if let Some(volume) = tree.find_child(geometry, NodeKind::Parameter, "volume") {
        if tree.get(volume).attr("derived") == Some("true") {
            tree.detach(volume);
        }
    }
}
