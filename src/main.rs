use std::io;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crunching::{Error, Grammar, LogTracer, Strategy};
use log::LevelFilter;

/// Match one line of stdin against a pattern, starting at its first byte.
///
/// Usage: echo <input_text> | crunching -E <pattern>
#[derive(Debug, Parser)]
#[command(name = "crunching", version, about)]
struct Args {
    /// Pattern to match with.
    #[arg(short = 'E', value_name = "PATTERN")]
    pattern: String,

    /// How the pattern is executed.
    #[arg(long, default_value_t = Strategy::default())]
    strategy: Strategy,

    /// Print every rule entry and exit to stderr.
    #[arg(long)]
    trace: bool,

    /// Require the whole line to be consumed.
    #[arg(long)]
    full: bool,

    /// Print the compiled program before matching.
    #[arg(long)]
    dump: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.trace {
        logger.filter_module("crunching", LevelFilter::Debug);
    }
    logger.format_timestamp(None).init();

    let mut grammar = Grammar::from_pattern(&args.pattern).with_context(|| format!("invalid pattern {:?}", args.pattern))?;
    if args.trace {
        grammar = grammar.with_tracer(Arc::new(LogTracer));
    }
    if args.dump {
        print!("{}", grammar.compiled());
    }

    let mut input_line = String::new();
    io::stdin().read_line(&mut input_line).context("reading stdin")?;
    let input = input_line.trim_end_matches('\n').to_owned();

    let parsed = match grammar.run(input, args.strategy) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1)
        }
    };
    if args.full && !parsed.remainder.is_empty() {
        eprintln!("{}", Error::Incomplete { position: parsed.position });
        process::exit(1)
    }
    println!("value: {}", parsed.value);
    println!("remainder: {:?}", parsed.remainder);
    Ok(())
}
