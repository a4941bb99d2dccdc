#![allow(clippy::empty_docs)]
#[derive(Parser)]
#[grammar = "parser/yacml_grammar.pest"] // relative to src
pub struct YacmlParser;

use std::collections::HashSet;

use pest::iterators::Pair;
use pest::Parser;

use crate::ast::{Node, NodeId, NodeKind, Payload, Reactant, StringSpan, Tree, Value};
use crate::error::CompileError;

/// keys whose value is a numeric or rate field, stored as `Parameter`
pub const PARAMETER_KEYS: &[&str] = &[
    "kf",
    "kb",
    "numKf",
    "numKb",
    "km",
    "kcat",
    "n",
    "N",
    "conc",
    "conc_init",
    "n_init",
    "conc_rate",
    "n_rate",
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
    "diff_const",
];

fn span_of(pair: &Pair<Rule>) -> Option<StringSpan> {
    Some(StringSpan {
        pos_start: pair.as_span().start(),
        pos_end: pair.as_span().end(),
    })
}

//name       = @{ !keyword ~ ("_" | ASCII_ALPHA) ~ ident_char* }
fn parse_name(pair: Pair<Rule>) -> &str {
    pair.as_str()
}

struct KeyVal<'a> {
    name: &'a str,
    value: Value,
    // value as written, quotes stripped
    raw: &'a str,
    span: Option<StringSpan>,
}

impl<'a> KeyVal<'a> {
    fn into_node(self) -> Node {
        let kind = if PARAMETER_KEYS.contains(&self.name) {
            NodeKind::Parameter
        } else {
            NodeKind::Variable
        };
        Node::new(kind, self.name, self.span).with_payload(Payload::Value(self.value))
    }
}

fn shape_error(
    message: String,
    tree: &Tree,
    scope: NodeId,
    span: Option<StringSpan>,
) -> CompileError {
    CompileError::Shape {
        message,
        scope: tree.path(scope),
        span,
    }
}

// keyval     = { name ~ "=" ~ value }
// value      = { number | string | name }
fn parse_keyval<'a>(
    pair: Pair<'a, Rule>,
    tree: &Tree,
    scope: NodeId,
) -> Result<KeyVal<'a>, CompileError> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let name = parse_name(inner.next().unwrap());
    let value = inner.next().unwrap().into_inner().next().unwrap();
    let (value, raw) = match value.as_rule() {
        Rule::number => match value.as_str().parse::<f64>() {
            Ok(number) if number.is_finite() => (Value::number(number), value.as_str()),
            _ => {
                return Err(shape_error(
                    format!("number {} is out of range", value.as_str()),
                    tree,
                    scope,
                    span_of(&value),
                ))
            }
        },
        // string = ${ "\"" ~ string_inner ~ "\"" }
        Rule::string => {
            let raw = value.into_inner().next().unwrap().as_str();
            (Value::from_text(raw), raw)
        }
        Rule::name => (Value::from_text(value.as_str()), value.as_str()),
        _ => unreachable!("{:?}", value.to_string()),
    };
    Ok(KeyVal {
        name,
        value,
        raw,
        span,
    })
}

// keyval_list = { "[" ~ keyval ~ ("," ~ keyval)* ~ "]" }
fn parse_keyval_list<'a>(
    pair: Pair<'a, Rule>,
    tree: &Tree,
    scope: NodeId,
) -> Result<Vec<KeyVal<'a>>, CompileError> {
    let mut seen = HashSet::new();
    let mut ret = Vec::new();
    for kv_pair in pair.into_inner() {
        let kv = parse_keyval(kv_pair, tree, scope)?;
        if !seen.insert(kv.name) {
            return Err(shape_error(
                format!("duplicate attribute {}", kv.name),
                tree,
                scope,
                kv.span,
            ));
        }
        ret.push(kv);
    }
    Ok(ret)
}

fn push_keyvals(
    pair: Pair<'_, Rule>,
    tree: &mut Tree,
    parent: NodeId,
) -> Result<(), CompileError> {
    for kv in parse_keyval_list(pair, tree, parent)? {
        tree.push(parent, kv.into_node());
    }
    Ok(())
}

// sub_list   = { stoich_term ~ ("+" ~ stoich_term)* }
// stoich_term = { integer? ~ name }
fn parse_sub_list(
    pair: Pair<Rule>,
    tree: &Tree,
    scope: NodeId,
) -> Result<Vec<Reactant>, CompileError> {
    pair.into_inner()
        .map(|term| {
            let mut inner = term.into_inner();
            let first = inner.next().unwrap();
            match first.as_rule() {
                Rule::integer => {
                    let stoichiometry = first.as_str().parse().map_err(|_| {
                        shape_error(
                            format!("stoichiometry {} is out of range", first.as_str()),
                            tree,
                            scope,
                            span_of(&first),
                        )
                    })?;
                    Ok(Reactant {
                        stoichiometry,
                        species: inner.next().unwrap().as_str().to_string(),
                    })
                }
                _ => Ok(Reactant {
                    stoichiometry: 1,
                    species: first.as_str().to_string(),
                }),
            }
        })
        .collect()
}

/// names reaction instances uniquely inside one body
#[derive(Default)]
struct ReactionNames {
    used: HashSet<String>,
    count: usize,
}

impl ReactionNames {
    fn next(&mut self, base: Option<&str>) -> String {
        let base = match base {
            Some(b) => b.to_string(),
            None => format!("reac{}", self.count),
        };
        self.count += 1;
        let mut name = base.clone();
        let mut k = 1;
        while self.used.contains(&name) {
            name = format!("{}_{}", base, k);
            k += 1;
        }
        self.used.insert(name.clone());
        name
    }
}

// body = { (species_decl | reaction_decl | variable_decl | reaction_inst | recipe_inst)+ }
fn parse_body(pair: Pair<'_, Rule>, tree: &mut Tree, scope: NodeId) -> Result<(), CompileError> {
    let mut reaction_names = ReactionNames::default();
    for stmt in pair.into_inner() {
        let span = span_of(&stmt);
        match stmt.as_rule() {
            // species_decl = { buffered? ~ species_kw ~ name ~ keyval_list ~ ";" }
            Rule::species_decl => {
                let mut inner = stmt.into_inner().peekable();
                let is_buffered = inner
                    .next_if(|p| p.as_rule() == Rule::buffered)
                    .is_some();
                let species_type = inner.next().unwrap().as_str();
                let name = parse_name(inner.next().unwrap());
                let node = Node::new(NodeKind::Species, name, span)
                    .with_attr("type", species_type)
                    .with_attr("is_buffered", if is_buffered { "true" } else { "false" });
                let species = tree.push(scope, node);
                push_keyvals(inner.next().unwrap(), tree, species)?;
            }
            Rule::reaction_decl => parse_reaction_decl(stmt, tree, scope)?,

            // reaction_inst = { sub_list ~ "<-" ~ (keyval_list | name) ~ "->" ~ sub_list ~ ";" }
            Rule::reaction_inst => {
                let mut inner = stmt.into_inner();
                let substrates = parse_sub_list(inner.next().unwrap(), tree, scope)?;
                let kinetics = inner.next().unwrap();
                let products = parse_sub_list(inner.next().unwrap(), tree, scope)?;
                if substrates.is_empty() || products.is_empty() {
                    return Err(CompileError::Shape {
                        message: "reaction needs at least one substrate and one product"
                            .to_string(),
                        scope: tree.path(scope),
                        span,
                    });
                }
                let payload = Payload::Reaction {
                    substrates,
                    products,
                };
                match kinetics.as_rule() {
                    Rule::name => {
                        let id = parse_name(kinetics);
                        let node = Node::new(
                            NodeKind::ReactionInstance,
                            &reaction_names.next(Some(id)),
                            span,
                        )
                        .with_attr("instance_of", id)
                        .with_payload(payload);
                        tree.push(scope, node);
                    }
                    _ => {
                        let node = Node::new(
                            NodeKind::ReactionInstance,
                            &reaction_names.next(None),
                            span,
                        )
                        .with_attr("type", "reaction")
                        .with_payload(payload);
                        let reaction = tree.push(scope, node);
                        push_keyvals(kinetics, tree, reaction)?;
                    }
                }
            }

            // variable_decl = { var_kw? ~ keyval ~ ";" }
            Rule::variable_decl => {
                let mut inner = stmt.into_inner().peekable();
                let var_type = inner
                    .next_if(|p| p.as_rule() == Rule::var_kw)
                    .map(|p| p.as_str());
                let kv = parse_keyval(inner.next().unwrap(), tree, scope)?;
                let mut node = Node::new(NodeKind::Variable, kv.name, span)
                    .with_payload(Payload::Value(kv.value));
                if let Some(var_type) = var_type {
                    node = node.with_attr("type", var_type);
                }
                tree.push(scope, node);
            }

            // recipe_inst = { name ~ name ~ ";" }
            Rule::recipe_inst => {
                let mut inner = stmt.into_inner();
                let recipe_id = parse_name(inner.next().unwrap());
                let name = parse_name(inner.next().unwrap());
                let node = Node::new(NodeKind::RecipeInstance, name, span)
                    .with_attr("instance_of", recipe_id);
                tree.push(scope, node);
            }
            _ => unreachable!("{:?}", stmt.to_string()),
        }
    }
    Ok(())
}

// reaction_decl = { reaction_kw ~ name ~ keyval_list ~ ";" }
fn parse_reaction_decl(
    pair: Pair<'_, Rule>,
    tree: &mut Tree,
    scope: NodeId,
) -> Result<(), CompileError> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let reaction_type = inner.next().unwrap().as_str();
    let id = parse_name(inner.next().unwrap());
    let node = Node::new(NodeKind::ReactionDeclaration, id, span).with_attr("type", reaction_type);
    let decl = tree.push(scope, node);
    push_keyvals(inner.next().unwrap(), tree, decl)
}

// recipe     = { "recipe" ~ name ~ "has" ~ body ~ end }
fn parse_recipe(pair: Pair<'_, Rule>, tree: &mut Tree) -> Result<(), CompileError> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let id = parse_name(inner.next().unwrap());
    let root = tree.root();
    let recipe = tree.push(root, Node::new(NodeKind::Recipe, id, span));
    parse_body(inner.next().unwrap(), tree, recipe)
}

// compartment = { "compartment" ~ name ~ "is" ~ geometry ~ "has" ~ body ~ end }
// geometry    = { diffusive? ~ shape ~ keyval_list? }
fn parse_compartment(pair: Pair<'_, Rule>, tree: &mut Tree) -> Result<(), CompileError> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let name = parse_name(inner.next().unwrap());
    let root = tree.root();
    let compartment = tree.push(root, Node::new(NodeKind::Compartment, name, span));

    let geometry_pair = inner.next().unwrap();
    let geometry_span = span_of(&geometry_pair);
    let mut geometry_inner = geometry_pair.into_inner().peekable();
    let is_diffusive = geometry_inner
        .next_if(|p| p.as_rule() == Rule::diffusive)
        .is_some();
    let shape = geometry_inner.next().unwrap().as_str();
    let geometry = tree.push(
        compartment,
        Node::new(NodeKind::Geometry, "geometry", geometry_span)
            .with_attr("shape", shape)
            .with_attr("diffusive", if is_diffusive { "true" } else { "false" }),
    );
    if let Some(keyvals) = geometry_inner.next() {
        push_keyvals(keyvals, tree, geometry)?;
    }
    parse_body(inner.next().unwrap(), tree, compartment)
}

// model      = { model_kw ~ name ~ "has" ~ (compt_inst | simulator)+ ~ end }
fn parse_model(pair: Pair<'_, Rule>, tree: &mut Tree) -> Result<(), CompileError> {
    let span = span_of(&pair);
    let mut inner = pair.into_inner();
    let model_type = inner.next().unwrap().as_str();
    let name = parse_name(inner.next().unwrap());
    let root = tree.root();
    let model = tree.push(
        root,
        Node::new(NodeKind::Model, name, span).with_attr("type", model_type),
    );
    let mut n_instances = 0;
    let mut n_simulators = 0;
    for stmt in inner {
        let span = span_of(&stmt);
        match stmt.as_rule() {
            // compt_inst = { nature? ~ name ~ "is" ~ name ~ keyval_list? ~ ";" }
            Rule::compt_inst => {
                n_instances += 1;
                let mut stmt_inner = stmt.into_inner().peekable();
                let nature = stmt_inner
                    .next_if(|p| p.as_rule() == Rule::nature)
                    .map(|p| p.as_str());
                let name = parse_name(stmt_inner.next().unwrap());
                let compartment_id = parse_name(stmt_inner.next().unwrap());
                let mut node = Node::new(NodeKind::CompartmentInstance, name, span)
                    .with_attr("instance_of", compartment_id);
                if let Some(nature) = nature {
                    node = node.with_attr("nature", nature);
                }
                let instance = tree.push(model, node);
                if let Some(keyvals) = stmt_inner.next() {
                    push_keyvals(keyvals, tree, instance)?;
                }
            }
            // simulator  = { "simulator" ~ name ~ keyval_list? ~ ";" }
            Rule::simulator => {
                n_simulators += 1;
                if n_simulators > 1 {
                    return Err(CompileError::Shape {
                        message: "a model has at most one simulator".to_string(),
                        scope: tree.path(model),
                        span,
                    });
                }
                let mut stmt_inner = stmt.into_inner();
                let name = parse_name(stmt_inner.next().unwrap());
                let mut node = Node::new(NodeKind::Simulator, name, span);
                if let Some(keyvals) = stmt_inner.next() {
                    for kv in parse_keyval_list(keyvals, tree, model)? {
                        node = node.with_attr(kv.name, kv.raw);
                    }
                }
                tree.push(model, node);
            }
            Rule::end => (),
            _ => unreachable!("{:?}", stmt.to_string()),
        }
    }
    if n_instances == 0 {
        return Err(CompileError::Shape {
            message: "a model needs at least one compartment instance".to_string(),
            scope: tree.path(model),
            span,
        });
    }
    Ok(())
}

pub fn parse_string(text: &str) -> Result<Tree, CompileError> {
    let main = YacmlParser::parse(Rule::main, text)?.next().unwrap();
    let program = main.into_inner().next().unwrap();
    let mut tree = Tree::new();
    for item in program.into_inner() {
        match item.as_rule() {
            Rule::recipe => parse_recipe(item, &mut tree)?,
            Rule::reaction_decl => {
                let root = tree.root();
                parse_reaction_decl(item, &mut tree, root)?
            }
            Rule::compartment => parse_compartment(item, &mut tree)?,
            Rule::model => parse_model(item, &mut tree)?,
            _ => unreachable!("{:?}", item.to_string()),
        }
    }
    log::debug!("parsed {} nodes", tree.len());
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::parse_string;
    use crate::ast::{NodeKind, Reactant};
    use crate::error::CompileError;

    const STATIC_MODEL: &str = "
        compartment C is cube [volume=1] has
            pool a [conc_init=1.0];
            pool b [conc_init=0.0];
            reaction r [kf=4.0, kb=0.2];
            a <- r -> b;
        end
        model m has
            c1 is C;
        end
    ";

    #[test]
    fn static_model() {
        let tree = parse_string(STATIC_MODEL).unwrap();
        let root = tree.root();
        let compartments = tree.children_of_kind(root, NodeKind::Compartment);
        assert_eq!(compartments.len(), 1);
        let c = compartments[0];
        let geometry = tree.children_of_kind(c, NodeKind::Geometry);
        assert_eq!(geometry.len(), 1);
        assert_eq!(tree.get(geometry[0]).attr("shape"), Some("cube"));
        let volume = tree.find_child(geometry[0], NodeKind::Parameter, "volume").unwrap();
        assert_eq!(tree.value(volume).unwrap().as_number(), Some(1.0));

        assert_eq!(tree.children_of_kind(c, NodeKind::Species).len(), 2);
        let decl = tree.find_child(c, NodeKind::ReactionDeclaration, "r").unwrap();
        let kf = tree.find_child(decl, NodeKind::Parameter, "kf").unwrap();
        assert!(tree.value(kf).unwrap().is_reduced);
        assert_eq!(tree.value(kf).unwrap().text, "4.0");

        let reactions = tree.children_of_kind(c, NodeKind::ReactionInstance);
        assert_eq!(reactions.len(), 1);
        let reaction = tree.get(reactions[0]);
        assert_eq!(reaction.attr("instance_of"), Some("r"));
        let (subs, prds) = reaction.reactants().unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(prds.len(), 1);

        let model = tree.children_of_kind(root, NodeKind::Model)[0];
        let instances = tree.children_of_kind(model, NodeKind::CompartmentInstance);
        assert_eq!(tree.get(instances[0]).attr("instance_of"), Some("C"));
    }

    #[test]
    fn stoichiometry_and_inline_kinetics() {
        let text = "
            compartment C is cylinder [radius=1e-6, length=2e-6] has
                2a + b <- [kf=\"k*2\", kb=0.1] -> 3 c;
                a <- [kf=1] -> b;
                var k = 3;
            end
            model m has c is C; end
        ";
        let tree = parse_string(text).unwrap();
        let c = tree.children_of_kind(tree.root(), NodeKind::Compartment)[0];
        let reactions = tree.children_of_kind(c, NodeKind::ReactionInstance);
        assert_eq!(tree.get(reactions[0]).name, "reac0");
        assert_eq!(tree.get(reactions[1]).name, "reac1");
        let (subs, prds) = tree.get(reactions[0]).reactants().unwrap();
        assert_eq!(
            subs,
            &[
                Reactant {
                    stoichiometry: 2,
                    species: "a".to_string()
                },
                Reactant {
                    stoichiometry: 1,
                    species: "b".to_string()
                }
            ]
        );
        assert_eq!(prds[0].stoichiometry, 3);
        let kf = tree.find_child(reactions[0], NodeKind::Parameter, "kf").unwrap();
        assert!(!tree.value(kf).unwrap().is_reduced);
        assert_eq!(tree.value(kf).unwrap().text, "k*2");
        let k = tree.find_child(c, NodeKind::Variable, "k").unwrap();
        assert_eq!(tree.get(k).attr("type"), Some("var"));
    }

    #[test]
    fn comments_recipes_and_simulator() {
        let text = "
            // a recipe
            recipe R has
                /* block
                   comment */
                buffered pool x [conc=0.1];
                enz_reac e [km=1, kcat=2];
            end R
            compartment C is diffusive spine has
                R r1;
                R r2;
            end
            pathway p has
                stochastic c1 is C [volume=2];
                simulator ksolve [method=\"rk5\", dt=0.1];
            end
        ";
        let tree = parse_string(text).unwrap();
        let root = tree.root();
        let recipe = tree.children_of_kind(root, NodeKind::Recipe)[0];
        let x = tree.find_child(recipe, NodeKind::Species, "x").unwrap();
        assert_eq!(tree.get(x).attr("is_buffered"), Some("true"));
        let c = tree.children_of_kind(root, NodeKind::Compartment)[0];
        let instances = tree.children_of_kind(c, NodeKind::RecipeInstance);
        assert_eq!(instances.len(), 2);
        assert_eq!(tree.get(instances[1]).name, "r2");
        assert_eq!(tree.get(instances[1]).attr("instance_of"), Some("R"));
        let model = tree.children_of_kind(root, NodeKind::Model)[0];
        let instance = tree.children_of_kind(model, NodeKind::CompartmentInstance)[0];
        assert_eq!(tree.get(instance).attr("nature"), Some("stochastic"));
        let simulator = tree.children_of_kind(model, NodeKind::Simulator)[0];
        assert_eq!(tree.get(simulator).attr("method"), Some("rk5"));
        assert_eq!(tree.get(simulator).attr("dt"), Some("0.1"));
    }

    #[test]
    fn duplicate_attribute() {
        let text = "
            compartment C is cube has
                pool a [conc=1, conc=2];
            end
            model m has c is C; end
        ";
        match parse_string(text) {
            Err(CompileError::Shape { message, .. }) => assert!(message.contains("conc")),
            other => panic!("expected shape error, got {:?}", other),
        }
    }

    #[test]
    fn out_of_range_numbers() {
        for (text, what) in [
            ("5000000000 a <- [kf=1, kb=1] -> b;", "stoichiometry 5000000000"),
            ("pool a [conc=1e400];", "number 1e400"),
            ("var big = -1e999;", "number -1e999"),
        ] {
            let text = format!("compartment C is cube has {} end model m has c is C; end", text);
            match parse_string(&text) {
                Err(CompileError::Shape { message, span, .. }) => {
                    assert!(message.contains(what), "{}", message);
                    assert!(span.is_some());
                }
                other => panic!("expected shape error for {}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn syntax_error_position() {
        let text = "compartment C is cube has\n  pool a [conc=1]\nend\nmodel m has c is C; end";
        match parse_string(text) {
            Err(CompileError::Syntax { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn keywords_are_not_identifiers() {
        let text = "compartment end is cube has pool a [conc=1]; end model m has c is C; end";
        assert!(matches!(
            parse_string(text),
            Err(CompileError::Syntax { .. })
        ));
    }
}
