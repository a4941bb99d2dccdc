pub mod expr;
pub mod tree;

pub use expr::{canonical_number, BinaryOp, EvalError, Expr, TIME_SYMBOL};
pub use tree::{Node, NodeId, NodeKind, Payload, Reactant, StringSpan, Tree, Value};
