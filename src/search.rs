use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use clap::ValueEnum;
use log::{debug, info, trace, warn};
use num::{BigUint, ToPrimitive};
use rayon::prelude::*;

use crate::ack::{evaluate, nested, Budget, Machine};
use crate::closed_form::{conjectured_mod, nested_mod, threaded};
use crate::error::EvalError;

pub const MODULUS: u64 = 32768;
pub const TARGET: u64 = 6;
pub const SEARCH_A: u64 = 4;
pub const SEARCH_B: u64 = 1;

const PROGRESS_EVERY: u64 = 1024;

/// Where the search gets the value at each candidate `h`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Oracle {
    /// b*(h+1) + a*h, unverified
    Conjectured,
    /// exact two-register evaluator, first register
    Recursive,
    /// exact nested evaluator
    Nested,
    /// closed form of the two-register evaluator
    Threaded,
    /// closed form of the nested evaluator, exact mod the modulus
    Derived,
    /// nested evaluator in machine words that wrap at the modulus
    Machine,
}

impl Oracle {
    /// The value at `(a, b, h)` reduced mod `modulus`. Exact oracles only
    /// reduce the final value.
    pub fn residue(self, a: u64, b: u64, h: u64, modulus: u64, budget: Budget) -> Result<u64, EvalError> {
        let m = BigUint::from(modulus);
        // anything reduced mod a u64 fits back into one
        let reduce = |v: BigUint| (v % &m).to_u64().unwrap_or_default();
        let (ba, bb, bh) = (BigUint::from(a), BigUint::from(b), BigUint::from(h));
        match self {
            Oracle::Conjectured => Ok(conjectured_mod(a, b, h, modulus)),
            Oracle::Recursive => evaluate(&ba, &bb, &bh, budget).map(|p| reduce(p.first)),
            Oracle::Nested => nested(&ba, &bb, &bh, budget).map(reduce),
            Oracle::Threaded => Ok(reduce(threaded(&ba, &bb, &bh).first)),
            Oracle::Derived => nested_mod(a, b, h, modulus),
            Oracle::Machine => {
                // every row costs a word of budget, so no budget covers u32::MAX rows
                let a = u32::try_from(a).map_err(|_| EvalError::BudgetExhausted(budget.max_steps))?;
                let mut machine = Machine::new(modulus, h, budget)?;
                machine.ack(a, b).map(u64::from)
            }
        }
    }
}

/// The outcome of one full pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pass {
    pub found: Vec<u64>,
    /// Candidates the oracle could not evaluate within its budget.
    pub skipped: Vec<u64>,
}

enum Verdict {
    Hit,
    Miss,
    Skipped,
}

/// Every `h` in `[0, modulus)` whose value at `(a, b, h)` is `target` mod `modulus`.
#[derive(Clone, Debug)]
pub struct Search {
    pub a: u64,
    pub b: u64,
    pub modulus: u64,
    pub target: u64,
    pub oracle: Oracle,
    pub budget: Budget,
    cancel: Option<Arc<AtomicBool>>,
}

impl Search {
    pub fn new(a: u64, b: u64, modulus: u64, target: u64, oracle: Oracle) -> Result<Self, EvalError> {
        if modulus == 0 {
            return Err(EvalError::ZeroModulus);
        }
        Ok(Search {
            a,
            b,
            modulus,
            target,
            oracle,
            budget: Budget::default(),
            cancel: None,
        })
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Stop with `EvalError::Interrupted` once `flag` is set.
    pub fn cancel_on(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    fn hits(&self, h: u64) -> Result<bool, EvalError> {
        let r = self
            .oracle
            .residue(self.a, self.b, h, self.modulus, self.budget)?;
        trace!("h = {} -> {}", h, r);
        Ok(r == self.target)
    }

    /// Out-of-reach candidates are skipped so the pass still covers the whole range.
    fn verdict(&self, h: u64) -> Result<Verdict, EvalError> {
        match self.hits(h) {
            Ok(true) => Ok(Verdict::Hit),
            Ok(false) => Ok(Verdict::Miss),
            Err(e) if e.is_out_of_reach() => {
                warn!("h = {} skipped: {}", h, e);
                Ok(Verdict::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    /// One full pass, lazily. Every call starts over from `h = 0`.
    pub fn matches(&self) -> Matches<'_> {
        Matches {
            search: self,
            next: 0,
            done: false,
            skipped: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn run(&self) -> Result<Pass, EvalError> {
        let mut matches = self.matches();
        let found = matches.by_ref().collect::<Result<Vec<_>, _>>()?;
        Ok(Pass {
            found,
            skipped: matches.into_skipped(),
        })
    }

    /// Same pass as `matches`, checked across the rayon pool. Matches are logged as
    /// they are found, in no particular order; the result is ascending.
    pub fn par_run(&self) -> Result<Pass, EvalError> {
        let checked = AtomicU64::new(0);
        let found = (0..self.modulus)
            .into_par_iter()
            .map(|h| {
                if self.cancelled() {
                    return Err(EvalError::Interrupted(checked.load(Ordering::SeqCst)));
                }
                let verdict = self.verdict(h)?;
                let n = checked.fetch_add(1, Ordering::SeqCst) + 1;
                if n % PROGRESS_EVERY == 0 {
                    debug!("checked {}/{}", n, self.modulus);
                }
                if let Verdict::Hit = verdict {
                    info!("found h = {}", h);
                }
                Ok((h, verdict))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut pass = Pass::default();
        for (h, verdict) in found {
            match verdict {
                Verdict::Hit => pass.found.push(h),
                Verdict::Skipped => pass.skipped.push(h),
                Verdict::Miss => {}
            }
        }
        Ok(pass)
    }
}

pub struct Matches<'a> {
    search: &'a Search,
    next: u64,
    done: bool,
    skipped: Vec<u64>,
}

impl Matches<'_> {
    /// Candidates skipped so far.
    pub fn into_skipped(self) -> Vec<u64> {
        self.skipped
    }
}

impl Iterator for Matches<'_> {
    type Item = Result<u64, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.next < self.search.modulus {
            let h = self.next;
            self.next += 1;
            if self.search.cancelled() {
                self.done = true;
                return Some(Err(EvalError::Interrupted(h)));
            }
            if h % PROGRESS_EVERY == 0 {
                debug!("checked {}/{}", h, self.search.modulus);
            }
            match self.search.verdict(h) {
                Ok(Verdict::Hit) => {
                    info!("found h = {}", h);
                    return Some(Ok(h));
                }
                Ok(Verdict::Miss) => {}
                Ok(Verdict::Skipped) => self.skipped.push(h),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl FusedIterator for Matches<'_> {}
