pub mod expr_parser;
pub use expr_parser::ExprParser;
pub use expr_parser::Rule as ExprRule;

pub fn parse_expr_string(text: &str) -> Result<Expr, CompileError> {
    expr_parser::parse_string(text)
}

pub mod yacml_parser;
pub use yacml_parser::Rule as YacmlRule;
pub use yacml_parser::YacmlParser;

pub fn parse_yacml_string(text: &str) -> Result<Tree, CompileError> {
    yacml_parser::parse_string(text)
}

use crate::ast::{Expr, Tree};
use crate::error::CompileError;

#[cfg(test)]
mod tests {
    use pest::Parser;

    use super::{YacmlParser, YacmlRule};

    const YACML_FILES: &[(&str, &str)] = &[
        ("test_simple_reac.yacml", include_str!("test_simple_reac.yacml")),
        ("test_recipe_reuse.yacml", include_str!("test_recipe_reuse.yacml")),
        ("test_enzyme.yacml", include_str!("test_enzyme.yacml")),
    ];

    #[test]
    fn parse_examples() {
        for (filename, contents) in YACML_FILES {
            let _list = YacmlParser::parse(YacmlRule::main, contents)
                .unwrap_or_else(|e| panic!("unsuccessful parse ({filename}) {e}"));
            super::parse_yacml_string(contents)
                .unwrap_or_else(|e| panic!("unsuccessful build ({filename}) {e}"));
        }
    }
}
