use anyhow::Result;
use clap::{Parser, ValueEnum};
use yacml::{compile, CompilerOptions, OutputFormat, Stage};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Xml,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StopAfter {
    Parse,
    Flatten,
    Reduce,
}

/// compiles a chemical reaction model (.yacml) into a flat, reference free document
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input filename
    input: String,

    /// Output filename
    #[arg(short, long)]
    out: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Xml)]
    format: Format,

    /// Last pass to run
    #[arg(long, value_enum, default_value_t = StopAfter::Reduce)]
    stage: StopAfter,

    /// Treat warnings as errors
    #[arg(long)]
    deny_warnings: bool,

    /// Log level, overrides RUST_LOG
    #[arg(short, long)]
    log_level: Option<log::LevelFilter>,
}

fn main() -> Result<()> {
    let cli = Args::parse();
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = cli.log_level {
        logger.filter_level(level);
    }
    logger.init();

    let options = CompilerOptions {
        format: match cli.format {
            Format::Xml => OutputFormat::Xml,
            Format::Json => OutputFormat::Json,
        },
        stop_after: match cli.stage {
            StopAfter::Parse => Stage::Parse,
            StopAfter::Flatten => Stage::Flatten,
            StopAfter::Reduce => Stage::Reduce,
        },
        deny_warnings: cli.deny_warnings,
    };
    compile(&cli.input, cli.out.as_deref(), options)
}
