use std::collections::{BTreeSet, HashMap};
use std::f64::consts::PI;
use std::fmt;

use thiserror::Error;

/// name of the time variable, never substituted at compile time
pub const TIME_SYMBOL: &str = "t";

/// (name, arity) of the functions an expression may call
pub const BUILTIN_FUNCTIONS: &[(&str, usize)] = &[
    ("sin", 1),
    ("cos", 1),
    ("tan", 1),
    ("asin", 1),
    ("acos", 1),
    ("atan", 1),
    ("sinh", 1),
    ("cosh", 1),
    ("tanh", 1),
    ("exp", 1),
    ("log", 1),
    ("ln", 1),
    ("log10", 1),
    ("sqrt", 1),
    ("abs", 1),
    ("floor", 1),
    ("ceil", 1),
    ("pow", 2),
    ("min", 2),
    ("max", 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            "**" | "^" => Some(Self::Pow),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.precedence() == 2
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne => 2,
            Self::Add | Self::Sub => 3,
            Self::Mul | Self::Div => 4,
            Self::Pow => 6,
        }
    }

    fn apply(&self, l: f64, r: f64) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            Self::Add => l + r,
            Self::Sub => l - r,
            Self::Mul => l * r,
            Self::Div => l / r,
            Self::Pow => l.powf(r),
            Self::Lt => truth(l < r),
            Self::Le => truth(l <= r),
            Self::Gt => truth(l > r),
            Self::Ge => truth(l >= r),
            Self::Eq => truth(l == r),
            Self::Ne => truth(l != r),
        }
    }
}

const TERNARY_PRECEDENCE: u8 = 1;
const UNARY_PRECEDENCE: u8 = 5;
const ATOM_PRECEDENCE: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Name(String),
    Monop {
        op: char,
        child: Box<Expr>,
    },
    Binop {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        fn_name: String,
        args: Vec<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("name {0} is not known at compile time")]
    Unbound(String),
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("function {fn_name} takes {expected} argument(s), {given} given")]
    Arity {
        fn_name: String,
        expected: usize,
        given: usize,
    },
    #[error("expression evaluates to {0}")]
    NonFinite(f64),
}

/// shortest text that parses back to the same f64
pub fn canonical_number(value: f64) -> String {
    format!("{:?}", value)
}

impl Expr {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Expr::Number(_))
    }

    /// every identifier leaf of the expression
    pub fn get_dependents(&self) -> BTreeSet<&str> {
        let mut deps = BTreeSet::new();
        self.collect_dependents(&mut deps);
        deps
    }

    fn collect_dependents<'a>(&'a self, deps: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number(_) => (),
            Expr::Name(name) => {
                deps.insert(name.as_str());
            }
            Expr::Monop { child, .. } => child.collect_dependents(deps),
            Expr::Binop { left, right, .. } => {
                left.collect_dependents(deps);
                right.collect_dependents(deps);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_dependents(deps)),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_dependents(deps);
                then.collect_dependents(deps);
                otherwise.collect_dependents(deps);
            }
        }
    }

    /// Replace every `Name` leaf found in `replacements` by the given number.
    /// Returns the number of leaves replaced.
    pub fn substitute(&mut self, replacements: &HashMap<String, f64>) -> usize {
        match self {
            Expr::Number(_) => 0,
            Expr::Name(name) => match replacements.get(name.as_str()) {
                Some(value) => {
                    *self = Expr::Number(*value);
                    1
                }
                None => 0,
            },
            Expr::Monop { child, .. } => child.substitute(replacements),
            Expr::Binop { left, right, .. } => {
                left.substitute(replacements) + right.substitute(replacements)
            }
            Expr::Call { args, .. } => args.iter_mut().map(|a| a.substitute(replacements)).sum(),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.substitute(replacements)
                    + then.substitute(replacements)
                    + otherwise.substitute(replacements)
            }
        }
    }

    /// Evaluate to a finite f64. `pi` is the only name known without a lookup.
    pub fn eval(&self) -> Result<f64, EvalError> {
        let value = self.eval_inner()?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NonFinite(value))
        }
    }

    fn eval_inner(&self) -> Result<f64, EvalError> {
        match self {
            Expr::Number(v) => Ok(*v),
            Expr::Name(name) => match name.as_str() {
                "pi" => Ok(PI),
                _ => Err(EvalError::Unbound(name.clone())),
            },
            Expr::Monop { op, child } => {
                let v = child.eval_inner()?;
                Ok(if *op == '-' { -v } else { v })
            }
            Expr::Binop { op, left, right } => {
                Ok(op.apply(left.eval_inner()?, right.eval_inner()?))
            }
            Expr::Call { fn_name, args } => {
                let expected = BUILTIN_FUNCTIONS
                    .iter()
                    .find(|(f, _)| f == fn_name)
                    .map(|(_, n)| *n)
                    .ok_or_else(|| EvalError::UnknownFunction(fn_name.clone()))?;
                if expected != args.len() {
                    return Err(EvalError::Arity {
                        fn_name: fn_name.clone(),
                        expected,
                        given: args.len(),
                    });
                }
                let a = args
                    .iter()
                    .map(|a| a.eval_inner())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match fn_name.as_str() {
                    "sin" => a[0].sin(),
                    "cos" => a[0].cos(),
                    "tan" => a[0].tan(),
                    "asin" => a[0].asin(),
                    "acos" => a[0].acos(),
                    "atan" => a[0].atan(),
                    "sinh" => a[0].sinh(),
                    "cosh" => a[0].cosh(),
                    "tanh" => a[0].tanh(),
                    "exp" => a[0].exp(),
                    "log" | "ln" => a[0].ln(),
                    "log10" => a[0].log10(),
                    "sqrt" => a[0].sqrt(),
                    "abs" => a[0].abs(),
                    "floor" => a[0].floor(),
                    "ceil" => a[0].ceil(),
                    "pow" => a[0].powf(a[1]),
                    "min" => a[0].min(a[1]),
                    "max" => a[0].max(a[1]),
                    _ => unreachable!("{}", fn_name),
                })
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval_inner()? != 0.0 {
                    then.eval_inner()
                } else {
                    otherwise.eval_inner()
                }
            }
        }
    }

    /// Fold every closed sub-expression into a number, leaving the rest intact.
    pub fn fold_constants(&mut self) {
        if self.is_number() {
            return;
        }
        if let Ok(value) = self.eval() {
            *self = Expr::Number(value);
            return;
        }
        match self {
            Expr::Monop { child, .. } => child.fold_constants(),
            Expr::Binop { left, right, .. } => {
                left.fold_constants();
                right.fold_constants();
            }
            Expr::Call { args, .. } => args.iter_mut().for_each(|a| a.fold_constants()),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.fold_constants();
                then.fold_constants();
                otherwise.fold_constants();
            }
            Expr::Number(_) | Expr::Name(_) => (),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Ternary { .. } => TERNARY_PRECEDENCE,
            Expr::Binop { op, .. } => op.precedence(),
            Expr::Monop { .. } => UNARY_PRECEDENCE,
            Expr::Number(v) if *v < 0.0 => UNARY_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{}", canonical_number(*v)),
            Expr::Name(name) => write!(f, "{}", name),
            Expr::Monop { op, child } => {
                write!(f, "{}", op)?;
                child.fmt_child(f, UNARY_PRECEDENCE + 1)
            }
            Expr::Binop { op, left, right } => {
                let p = op.precedence();
                // ** is right associative, comparisons do not chain
                let (lp, rp) = match op {
                    BinaryOp::Pow => (p + 1, p - 1),
                    _ if op.is_comparison() => (p + 1, p + 1),
                    _ => (p, p + 1),
                };
                left.fmt_child(f, lp)?;
                write!(f, " {} ", op.as_str())?;
                right.fmt_child(f, rp)
            }
            Expr::Call { fn_name, args } => {
                write!(f, "{}(", fn_name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.fmt_child(f, TERNARY_PRECEDENCE + 1)?;
                write!(f, " ? ")?;
                then.fmt_child(f, TERNARY_PRECEDENCE + 1)?;
                write!(f, " : ")?;
                otherwise.fmt_child(f, TERNARY_PRECEDENCE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{canonical_number, EvalError, Expr};
    use crate::parser::parse_expr_string;

    #[test]
    fn canonical_numbers() {
        assert_eq!(canonical_number(4.0), "4.0");
        assert_eq!(canonical_number(0.2), "0.2");
        assert_eq!(canonical_number(6.023e23), "6.023e23");
    }

    #[test]
    fn eval_precedence() {
        let cases = [
            ("1 + 2 * 3", 7.0),
            ("(1 + 2) * 3", 9.0),
            ("2 ** 3 ** 2", 512.0),
            ("-2 ** 2", -4.0),
            ("2 ** -1", 0.5),
            ("8 / 4 / 2", 1.0),
            ("1 < 2 ? 10 : 20", 10.0),
            ("max(1, 3) - min(4, 2)", 1.0),
            ("2 ^ 2", 4.0),
        ];
        for (text, expect) in cases {
            let expr = parse_expr_string(text).unwrap();
            assert_eq!(expr.eval().unwrap(), expect, "{}", text);
        }
    }

    #[test]
    fn eval_errors() {
        let expr = parse_expr_string("2.9*x").unwrap();
        assert_eq!(expr.eval(), Err(EvalError::Unbound("x".to_string())));
        let expr = parse_expr_string("foo(1)").unwrap();
        assert_eq!(
            expr.eval(),
            Err(EvalError::UnknownFunction("foo".to_string()))
        );
        let expr = parse_expr_string("1 / 0").unwrap();
        assert!(matches!(expr.eval(), Err(EvalError::NonFinite(_))));
    }

    #[test]
    fn substitute_whole_names_only() {
        let mut expr = parse_expr_string("Rabs + Rab").unwrap();
        let replacements = HashMap::from([("Rab".to_string(), 2.0), ("Rabs".to_string(), 3.0)]);
        assert_eq!(expr.substitute(&replacements), 2);
        assert_eq!(expr.eval().unwrap(), 5.0);
    }

    #[test]
    fn display_round_trips() {
        for text in [
            "a - (b - c)",
            "(a + b) * c",
            "-(a + b)",
            "(a ** b) ** c",
            "a ** b ** c",
            "x < 1 ? sin(t) : 2.0 * t",
        ] {
            let expr = parse_expr_string(text).unwrap();
            assert_eq!(parse_expr_string(&expr.to_string()).unwrap(), expr, "{}", text);
        }
        let expr = Expr::Binop {
            op: super::BinaryOp::Pow,
            left: Box::new(Expr::Number(-3.0)),
            right: Box::new(Expr::Number(2.0)),
        };
        assert_eq!(expr.to_string(), "(-3.0) ** 2.0");
    }

    #[test]
    fn fold_closed_subexpressions() {
        let mut expr = parse_expr_string("2 * 3 * x + sin(0)").unwrap();
        expr.fold_constants();
        assert_eq!(expr.to_string(), "6.0 * x + 0.0");
    }
}
