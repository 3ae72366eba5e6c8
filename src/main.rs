use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{debug, info, warn};
use num::{BigInt, ToPrimitive};

use crate::ack::{evaluate, nested, non_negative, Budget, DEFAULT_MAX_DEPTH, DEFAULT_MAX_STEPS};
use crate::closed_form::{conjectured, nested_exact, nested_mod, standard_reports, threaded};
use crate::error::EvalError;
use crate::registers::{Feedback, Registers};
use crate::search::{Oracle, Pass, Search, MODULUS, SEARCH_A, SEARCH_B, TARGET};

mod ack;
mod closed_form;
mod error;
mod mod_arith;
mod registers;
mod search;

// the register evaluator recurses natively
const STACK_SIZE: usize = 1 << 30;

/// Evaluate the teleporter check at `<a> <b> <h>`, or search for the `h` that passes it.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true, arg_required_else_help = true)]
struct Cli {
    #[arg(allow_negative_numbers = true, requires = "b")]
    a: Option<BigInt>,
    #[arg(allow_negative_numbers = true, requires = "h")]
    b: Option<BigInt>,
    #[arg(allow_negative_numbers = true)]
    h: Option<BigInt>,

    /// Give up on an exact evaluation after this many steps
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: u64,
    /// Deepest recursion the register evaluator may reach
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print every h in [0, modulus) that hits the target
    Search(SearchCmd),
    /// Check each closed form against the evaluator it stands in for
    Validate(ValidateCmd),
}

#[derive(Args)]
struct SearchCmd {
    #[arg(long, value_enum, default_value_t = Oracle::Conjectured)]
    oracle: Oracle,
    #[arg(short, default_value_t = SEARCH_A)]
    a: u64,
    #[arg(short, default_value_t = SEARCH_B)]
    b: u64,
    #[arg(long, default_value_t = MODULUS)]
    modulus: u64,
    #[arg(long, default_value_t = TARGET)]
    target: u64,
    /// Spread the candidates over every core
    #[arg(long)]
    parallel: bool,
}

#[derive(Args)]
struct ValidateCmd {
    /// Check every (a, b, h) in [0, max]^3
    #[arg(long, default_value_t = 3)]
    max: u64,
    #[arg(long, default_value_t = MODULUS)]
    modulus: u64,
}

/// Print one labeled line. Results an evaluator cannot reach are printed as
/// such; anything else is an error.
fn show<T: Display>(label: &str, value: Result<T, EvalError>) -> Result<Option<T>, EvalError> {
    match value {
        Ok(v) => {
            println!("{:<18} {}", label, v);
            Ok(Some(v))
        }
        Err(e) if e.is_out_of_reach() => {
            println!("{:<18} out of reach: {}", label, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn eval_mode(a: &BigInt, b: &BigInt, h: &BigInt, budget: Budget) -> Result<(), EvalError> {
    let a = non_negative("a", a)?;
    let b = non_negative("b", b)?;
    let h = non_negative("h", h)?;
    info!("evaluating ({}, {}, {})", a, b, h);

    let regs = |feedback| Registers::new(a.clone(), b.clone(), h.clone(), feedback, budget).run();
    show("registers", regs(Feedback::Carry))?;
    let exact = show("recursive", evaluate(&a, &b, &h, budget))?;
    let guess = show("conjectured", Ok::<_, EvalError>(conjectured(&a, &b, &h)))?;
    if let (Some(exact), Some(guess)) = (exact, guess) {
        let verdict = if exact.first == guess { "agrees" } else { "diverges" };
        println!("{:<18} {}", "", verdict);
    }

    show("nested", nested(&a, &b, &h, budget))?;
    show("nested registers", regs(Feedback::Result).map(|p| p.first))?;
    show("threaded", Ok::<_, EvalError>(threaded(&a, &b, &h)))?;
    show("derived", nested_exact(&a, &b, &h))?;
    if let (Some(a), Some(b), Some(h)) = (a.to_u64(), b.to_u64(), h.to_u64()) {
        show(&format!("derived mod {}", MODULUS), nested_mod(a, b, h, MODULUS))?;
    }
    Ok(())
}

fn search_mode(cmd: SearchCmd, budget: Budget) -> Result<(), EvalError> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        debug!("no Ctrl-C handler: {}", e);
    }

    let search = Search::new(cmd.a, cmd.b, cmd.modulus, cmd.target, cmd.oracle)?
        .with_budget(budget)
        .cancel_on(interrupted);
    info!(
        "searching h in [0, {}) for {:?}({}, {}, h) = {}",
        cmd.modulus, cmd.oracle, cmd.a, cmd.b, cmd.target
    );

    let pass = if cmd.parallel {
        let pass = search.par_run()?;
        for h in &pass.found {
            println!("{}", h);
        }
        pass
    } else {
        let mut matches = search.matches();
        let mut found = Vec::new();
        for h in matches.by_ref() {
            let h = h?;
            println!("{}", h);
            found.push(h);
        }
        Pass {
            found,
            skipped: matches.into_skipped(),
        }
    };
    info!("{} value(s) of h found", pass.found.len());
    if !pass.skipped.is_empty() {
        warn!("{} value(s) of h were out of reach and skipped", pass.skipped.len());
    }
    Ok(())
}

fn validate_mode(cmd: ValidateCmd, budget: Budget) -> Result<(), EvalError> {
    for report in standard_reports(cmd.max, cmd.modulus, budget)? {
        println!("{}", report);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let budget = Budget {
        max_steps: cli.max_steps,
        max_depth: cli.max_depth,
    };
    debug!("{:?}", budget);

    let pool = rayon::ThreadPoolBuilder::new()
        .stack_size(STACK_SIZE)
        .build()
        .context("could not build the worker pool")?;

    pool.install(|| match cli.command {
        Some(Command::Search(cmd)) => search_mode(cmd, budget).context("search failed"),
        Some(Command::Validate(cmd)) => validate_mode(cmd, budget).context("validation failed"),
        None => match (&cli.a, &cli.b, &cli.h) {
            (Some(a), Some(b), Some(h)) => eval_mode(a, b, h, budget).context("evaluation failed"),
            _ => Err(anyhow::anyhow!("expected <a> <b> <h> or a subcommand")),
        },
    })
}
