#![allow(clippy::empty_docs)]
#[derive(Parser)]
#[grammar = "parser/expr_grammar.pest"] // relative to src
pub struct ExprParser;

use pest::error::ErrorVariant;
use pest::iterators::Pair;
use pest::Parser;
use std::boxed::Box;

use crate::ast::{BinaryOp, Expr};
use crate::error::CompileError;

//sign       = @{ "-" | "+" }
fn parse_sign(pair: Pair<Rule>) -> char {
    pair.as_str().chars().next().unwrap_or('+')
}

fn binop(op: &str, left: Expr, right: Expr) -> Expr {
    Expr::Binop {
        op: BinaryOp::parse(op).unwrap_or_else(|| unreachable!("operator {}", op)),
        left: Box::new(left),
        right: Box::new(right),
    }
}

// left associative chain: operand ~ (op ~ operand)*
fn parse_chain(pair: Pair<'_, Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let mut head = parse_value(inner.next().unwrap());
    while let Some(op) = inner.next() {
        let rhs = parse_value(inner.next().unwrap());
        head = binop(op.as_str(), head, rhs);
    }
    head
}

fn parse_value(pair: Pair<'_, Rule>) -> Expr {
    match pair.as_rule() {
        // expression = { comparison ~ ("?" ~ expression ~ ":" ~ expression)? }
        Rule::expression => {
            let mut inner = pair.into_inner();
            let cond = parse_value(inner.next().unwrap());
            match (inner.next(), inner.next()) {
                (Some(then), Some(otherwise)) => Expr::Ternary {
                    cond: Box::new(cond),
                    then: Box::new(parse_value(then)),
                    otherwise: Box::new(parse_value(otherwise)),
                },
                _ => cond,
            }
        }

        // comparison = { sum ~ (cmp_op ~ sum)? }
        // sum        = { term ~ (term_op ~ term)* }
        // term       = { unary ~ (factor_op ~ unary)* }
        Rule::comparison | Rule::sum | Rule::term => parse_chain(pair),

        // unary      = { sign* ~ power }
        Rule::unary => {
            let inner: Vec<Pair<Rule>> = pair.into_inner().collect();
            let (power, signs) = inner.split_last().unwrap();
            signs
                .iter()
                .rev()
                .fold(parse_value(power.clone()), |child, sign| {
                    match (parse_sign(sign.clone()), child) {
                        ('+', child) => child,
                        (_, Expr::Number(v)) => Expr::Number(-v),
                        (op, child) => Expr::Monop {
                            op,
                            child: Box::new(child),
                        },
                    }
                })
        }

        // power      = { factor ~ (pow_op ~ unary)? }
        Rule::power => {
            let mut inner = pair.into_inner();
            let base = parse_value(inner.next().unwrap());
            match (inner.next(), inner.next()) {
                (Some(op), Some(exponent)) => binop(op.as_str(), base, parse_value(exponent)),
                _ => base,
            }
        }

        // factor     = { call | real | name | "(" ~ expression ~ ")" }
        Rule::factor => parse_value(pair.into_inner().next().unwrap()),

        // call       = { name ~ "(" ~ (expression ~ ("," ~ expression)*)? ~ ")" }
        Rule::call => {
            let mut inner = pair.into_inner();
            Expr::Call {
                fn_name: inner.next().unwrap().as_str().to_string(),
                args: inner.map(parse_value).collect(),
            }
        }

        Rule::name => Expr::Name(pair.as_str().to_string()),

        // real       = @{ ... }
        Rule::real => Expr::Number(pair.as_str().parse().unwrap()),

        _ => unreachable!("{:?}", pair.to_string()),
    }
}

pub fn parse_string(text: &str) -> Result<Expr, CompileError> {
    let main = ExprParser::parse(Rule::main, text)?.next().unwrap();
    let overflow = main.clone().into_inner().flatten().find(|p| {
        p.as_rule() == Rule::real && !p.as_str().parse::<f64>().is_ok_and(f64::is_finite)
    });
    if let Some(real) = overflow {
        let err = pest::error::Error::new_from_span(
            ErrorVariant::<Rule>::CustomError {
                message: format!("number {} is out of range", real.as_str()),
            },
            real.as_span(),
        );
        return Err(err.into());
    }
    Ok(parse_value(main.into_inner().next().unwrap()))
}
