extern crate pest;
#[macro_use]
extern crate pest_derive;

pub mod ast;
pub mod emit;
pub mod error;
pub mod flatten;
pub mod parser;
pub mod reduce;

use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::info;

pub use ast::Tree;
pub use emit::Element;
pub use error::{CompileError, Warning, Warnings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Xml => "xml",
            OutputFormat::Json => "json",
        }
    }
}

/// last pass run by [`compile_str`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Stage {
    Parse,
    Flatten,
    #[default]
    Reduce,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Parse => write!(f, "parse"),
            Stage::Flatten => write!(f, "flatten"),
            Stage::Reduce => write!(f, "reduce"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub format: OutputFormat,
    pub stop_after: Stage,
    /// fail the compilation if any warning was raised
    pub deny_warnings: bool,
}

/// Result of a successful compilation.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub tree: Tree,
    pub warnings: Warnings,
}

impl Compilation {
    pub fn emit(&self) -> Element {
        emit::emit(&self.tree)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        let doc = self.emit();
        match format {
            OutputFormat::Xml => Ok(doc.to_xml()),
            OutputFormat::Json => Ok(doc.to_json()?),
        }
    }
}

/// Run the passes up to `options.stop_after` on `text`.
pub fn compile_str(text: &str, options: &CompilerOptions) -> Result<Compilation, CompileError> {
    let mut warnings = Warnings::new();
    let mut tree = parser::parse_yacml_string(text)?;
    if options.stop_after >= Stage::Flatten {
        flatten::flatten(&mut tree, &mut warnings)?;
    }
    if options.stop_after >= Stage::Reduce {
        reduce::reduce(&mut tree, &mut warnings)?;
    }
    info!(
        "compiled up to {} with {} warning(s)",
        options.stop_after,
        warnings.len()
    );
    Ok(Compilation { tree, warnings })
}

/// Compile the file `input`, writing the document to `out`, or next to the
/// input with the extension of the output format.
pub fn compile(input: &str, out: Option<&str>, options: CompilerOptions) -> Result<()> {
    let text = std::fs::read_to_string(input).with_context(|| format!("reading {}", input))?;
    let compilation = compile_str(&text, &options)
        .map_err(|e| anyhow!("{}: {}", input, e.as_error_message(&text)))?;
    if !compilation.warnings.is_empty() {
        eprint!("{}", compilation.warnings.as_error_message(&text));
        if options.deny_warnings {
            return Err(anyhow!(
                "{}: {} warning(s) with warnings denied",
                input,
                compilation.warnings.len()
            ));
        }
    }
    let out = match out {
        Some(out) => out.to_string(),
        None => Path::new(input)
            .with_extension(options.format.extension())
            .to_string_lossy()
            .into_owned(),
    };
    let rendered = compilation.render(options.format)?;
    std::fs::write(&out, rendered).with_context(|| format!("writing {}", out))?;
    info!("wrote {}", out);
    Ok(())
}
