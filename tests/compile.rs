use approx::assert_relative_eq;
use yacml::{compile_str, CompileError, CompilerOptions, Element, Stage};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn emitted(text: &str) -> Element {
    init();
    let compilation = compile_str(text, &CompilerOptions::default())
        .unwrap_or_else(|e| panic!("{}", e.as_error_message(text)));
    compilation.emit()
}

fn number(e: &Element) -> f64 {
    assert_eq!(e.attribute("is_reduced"), Some("true"), "{:?}", e);
    e.text.as_deref().unwrap().parse().unwrap()
}

fn model(doc: &Element) -> &Element {
    doc.children_with_tag("model").next().unwrap()
}

const STATIC: &str = "
    compartment C is cube [volume=1] has
        pool a [conc_init=1.0];
        pool b [conc_init=0.0];
        reaction r [kf=4.0, kb=0.2];
        a <- r -> b;
    end
    model m has c1 is C; end
";

#[test]
fn fully_static_reduction() {
    let doc = emitted(STATIC);
    let c1 = model(&doc).child("compartment", "c1").unwrap();
    assert_eq!(c1.children_with_tag("species").count(), 2);
    let reactions: Vec<&Element> = c1.children_with_tag("reaction").collect();
    assert_eq!(reactions.len(), 1);
    let r = reactions[0];
    assert_eq!(r.children_with_tag("substrate").count(), 1);
    assert_eq!(r.children_with_tag("product").count(), 1);
    let kf = r.child("parameter", "kf").unwrap();
    let kb = r.child("parameter", "kb").unwrap();
    assert_eq!(kf.text.as_deref(), Some("4.0"));
    assert_eq!(kb.text.as_deref(), Some("0.2"));
    assert_eq!(number(kf), 4.0);
}

#[test]
fn partial_reduction() {
    init();
    let text = "
        compartment C is cube [volume=1] has
            const vm = \"2.9*x\";
        end
        model m has c is C; end
    ";
    let compilation = compile_str(text, &CompilerOptions::default()).unwrap();
    assert!(compilation.warnings.is_empty());
    let doc = compilation.emit();
    let vm = model(&doc)
        .child("compartment", "c")
        .unwrap()
        .child("variable", "vm")
        .unwrap();
    assert_eq!(vm.attribute("is_reduced"), Some("false"));
    assert_eq!(vm.text.as_deref(), Some("2.9*x"));
}

#[test]
fn recipe_reuse() {
    let doc = emitted(
        "
        recipe R has
            pool a [conc_init=1];
            pool b [conc_init=0];
            reaction r [kf=\"10 * volume\", kb=1];
            a <- r -> b;
        end
        compartment Small is cube [volume=2] has R x; end
        compartment Large is cube [side=\"cbrt5\"] has
            var cbrt5 = \"5 ** (1/3)\";
            R x;
        end
        model m has
            s is Small;
            l is Large;
        end
        ",
    );
    let kf = |compartment: &str| {
        let c = model(&doc).child("compartment", compartment).unwrap();
        let net = c.child("chemical_reaction_subnetwork", "x").unwrap();
        assert_eq!(net.attribute("type"), Some("R"));
        number(net.child("reaction", "r").unwrap().child("parameter", "kf").unwrap())
    };
    assert_relative_eq!(kf("s"), 20.0);
    assert_relative_eq!(kf("l"), 50.0, max_relative = 1e-12);
}

#[test]
fn copies_reduce_independently() {
    let doc = emitted(
        "
        recipe R has
            pool p [conc_init=\"scale * 3\"];
        end
        compartment A is cube [volume=1] has var scale = 1; R x; end
        compartment B is cube [volume=1] has var scale = 2; R x; end
        model m has a is A; b is B; b2 is B [scale=4]; end
        ",
    );
    let conc = |compartment: &str| {
        let c = model(&doc).child("compartment", compartment).unwrap();
        let p = c
            .child("chemical_reaction_subnetwork", "x")
            .unwrap()
            .child("species", "p")
            .unwrap();
        number(p.child("parameter", "conc_init").unwrap())
    };
    assert_eq!(conc("a"), 3.0);
    assert_eq!(conc("b"), 6.0);
    assert_eq!(conc("b2"), 12.0);
    // the recipe itself keeps its expression
    let recipe = doc.child("recipe", "R").unwrap();
    let p = recipe.child("species", "p").unwrap();
    let conc_init = p.child("parameter", "conc_init").unwrap();
    assert_eq!(conc_init.attribute("is_reduced"), Some("false"));
}

fn assert_reference_free(e: &Element) {
    assert!(e.attribute("instance_of").is_none(), "{:?}", e);
    assert_ne!(e.tag, "recipe_instance");
    assert_ne!(e.tag, "compartment_instance");
    e.children.iter().for_each(assert_reference_free);
}

#[test]
fn no_dangling_references() {
    for text in [
        include_str!("../src/parser/test_simple_reac.yacml"),
        include_str!("../src/parser/test_recipe_reuse.yacml"),
        include_str!("../src/parser/test_enzyme.yacml"),
    ] {
        assert_reference_free(&emitted(text));
    }
}

#[test]
fn longest_match_substitution() {
    let doc = emitted(
        "
        compartment C is cube [volume=1] has
            const Rab = 2;
            const Rabs = 3;
            var s = \"Rabs + Rab\";
        end
        model m has c is C; end
        ",
    );
    let s = model(&doc)
        .child("compartment", "c")
        .unwrap()
        .child("variable", "s")
        .unwrap();
    assert_eq!(number(s), 5.0);
}

#[test]
fn cycle_detection() {
    init();
    let text = "
        compartment C is cube [volume=1] has
            const a = \"b + 1\";
            const b = \"a + 1\";
        end
        model m has c is C; end
    ";
    let err = compile_str(text, &CompilerOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::Cycle { .. }));
    assert_eq!(err.to_string(), "cyclic dependency between {a, b} in /C");

    // the cycle is only found by the reducer
    let options = CompilerOptions {
        stop_after: Stage::Flatten,
        ..Default::default()
    };
    assert!(compile_str(text, &options).is_ok());
}

#[test]
fn syntax_errors_have_positions() {
    init();
    let text = "compartment C is cube has\n    pool a [conc_init 1];\nend\nmodel m has c is C; end";
    let err = compile_str(text, &CompilerOptions::default()).unwrap_err();
    match err {
        CompileError::Syntax { line, col, .. } => {
            assert_eq!(line, 2);
            assert_eq!(col, 23);
        }
        _ => panic!("expected a syntax error, got {}", err),
    }
}
