use std::fmt;
use std::fmt::Write;

use itertools::Itertools;
use pest::Span;
use thiserror::Error;

use crate::ast::StringSpan;

fn line_col(input: &str, source_ref: StringSpan) -> Option<(usize, usize)> {
    Span::new(input, source_ref.pos_start, source_ref.pos_end).map(|s| s.start_pos().line_col())
}

fn found_text(found: &usize) -> String {
    match found {
        0 => "was not found".to_string(),
        n => format!("is declared {} times", n),
    }
}

fn join_names(names: &[String]) -> String {
    names.iter().join(", ")
}

/// Fatal errors, each one aborts the compilation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("syntax error at line {line}, column {col} near `{token}`: {message}")]
    Syntax {
        line: usize,
        col: usize,
        token: String,
        message: String,
    },

    #[error("{what} `{id}` referenced in {scope} {}", found_text(.found))]
    Reference {
        what: &'static str,
        id: String,
        scope: String,
        found: usize,
        span: Option<StringSpan>,
    },

    #[error("{message} (in {scope})")]
    Shape {
        message: String,
        scope: String,
        span: Option<StringSpan>,
    },

    #[error("cyclic dependency between {{{}}} in {scope}", join_names(.names))]
    Cycle {
        scope: String,
        names: Vec<String>,
        span: Option<StringSpan>,
    },
}

impl CompileError {
    pub fn span(&self) -> Option<StringSpan> {
        match self {
            CompileError::Reference { span, .. }
            | CompileError::Shape { span, .. }
            | CompileError::Cycle { span, .. } => *span,
            _ => None,
        }
    }

    pub fn as_error_message(&self, input: &str) -> String {
        match self.span().and_then(|s| line_col(input, s)) {
            Some((line, col)) => format!("Line {}, Column {}: Error: {}", line, col, self),
            None => format!("Error: {}", self),
        }
    }
}

impl<R: pest::RuleType> From<pest::error::Error<R>> for CompileError {
    fn from(err: pest::error::Error<R>) -> Self {
        let (line, col) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        let token = err
            .line()
            .chars()
            .skip(col.saturating_sub(1))
            .take_while(|c| !c.is_whitespace())
            .collect::<String>();
        let message = match &err.variant {
            pest::error::ErrorVariant::ParsingError {
                positives,
                negatives,
            } => {
                let mut msg = String::new();
                if !positives.is_empty() {
                    let _ = write!(msg, "expected one of {:?}", positives);
                }
                if !negatives.is_empty() {
                    let _ = write!(msg, "unexpected {:?}", negatives);
                }
                msg
            }
            pest::error::ErrorVariant::CustomError { message } => message.clone(),
        };
        CompileError::Syntax {
            line,
            col,
            token,
            message,
        }
    }
}

/// A non fatal diagnostic, returned alongside a successful compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    text: String,
    source_ref: Option<StringSpan>,
}

impl Warning {
    pub fn new(text: String, span: Option<StringSpan>) -> Self {
        Self {
            text,
            source_ref: span,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn as_error_message(&self, f: &mut String, input: &str) -> fmt::Result {
        match self.source_ref.and_then(|s| line_col(input, s)) {
            Some((line, col)) => write!(f, "Line {}, Column {}: Warning: {}", line, col, self.text),
            None => write!(f, "Warning: {}", self.text),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(source_ref) = self.source_ref {
            write!(f, "{}: Warning: {}", source_ref, self.text)
        } else {
            write!(f, "Warning: {}", self.text)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Warnings {
    warnings: Vec<Warning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// record a warning, it is also sent to the log
    pub fn push(&mut self, new: Warning) {
        log::warn!("{}", new);
        self.warnings.push(new);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.warnings.iter()
    }

    pub fn as_error_message(&self, input: &str) -> String {
        let mut buf = "\n".to_string();
        for warning in self.warnings.iter() {
            if warning.as_error_message(&mut buf, input).is_err() {
                break;
            }
            buf.push('\n');
        }
        buf
    }

    pub fn has_warning_contains(&self, text: &str) -> bool {
        self.warnings.iter().any(|w| w.text.contains(text))
    }
}

impl fmt::Display for Warnings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.warnings
            .iter()
            .try_for_each(|warning| writeln!(f, "{}", warning))
    }
}

#[cfg(test)]
mod tests {
    use super::{CompileError, Warning, Warnings};
    use crate::ast::StringSpan;

    #[test]
    fn reference_error_message() {
        let text = "compartment A is cube has\n  R r1;\nend";
        let err = CompileError::Reference {
            what: "recipe",
            id: "R".to_string(),
            scope: "/A".to_string(),
            found: 0,
            span: Some(StringSpan {
                pos_start: 28,
                pos_end: 33,
            }),
        };
        assert_eq!(
            err.as_error_message(text),
            "Line 2, Column 3: Error: recipe `R` referenced in /A was not found"
        );
    }

    #[test]
    fn cycle_error_names_members() {
        let err = CompileError::Cycle {
            scope: "/C".to_string(),
            names: vec!["a".to_string(), "b".to_string()],
            span: Some(StringSpan {
                pos_start: 4,
                pos_end: 9,
            }),
        };
        assert_eq!(err.to_string(), "cyclic dependency between {a, b} in /C");
        assert_eq!(
            err.as_error_message("x
  a = b;"),
            "Line 2, Column 3: Error: cyclic dependency between {a, b} in /C"
        );
    }

    #[test]
    fn warnings_render_positions() {
        let text = "a\nbcd";
        let mut warnings = Warnings::new();
        warnings.push(Warning::new(
            "something odd".to_string(),
            Some(StringSpan {
                pos_start: 3,
                pos_end: 4,
            }),
        ));
        warnings.push(Warning::new("no position".to_string(), None));
        assert_eq!(warnings.len(), 2);
        assert!(warnings.has_warning_contains("odd"));
        assert_eq!(
            warnings.as_error_message(text),
            "\nLine 2, Column 2: Warning: something odd\nWarning: no position\n"
        );
    }
}
