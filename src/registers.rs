//! The evaluator written the way the obfuscated routine is: two registers
//! mutated in place by a routine that calls itself.

use num::{BigUint, Zero};

use crate::ack::{Budget, Pair};
use crate::error::EvalError;

/// What the second register holds once the inner call `(a, b - 1)` returns.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Feedback {
    /// Whatever the inner call left in it.
    Carry,
    /// The inner result, copied over from the first register.
    Result,
}

pub struct Registers {
    a: BigUint,
    b: BigUint,
    h: BigUint,
    feedback: Feedback,
    budget: Budget,
    steps: u64,
    depth: usize,
}

impl Registers {
    pub fn new(a: BigUint, b: BigUint, h: BigUint, feedback: Feedback, budget: Budget) -> Self {
        Registers {
            a,
            b,
            h,
            feedback,
            budget,
            steps: 0,
            depth: 0,
        }
    }

    pub fn run(mut self) -> Result<Pair, EvalError> {
        self.call()?;
        Ok(Pair {
            first: self.a,
            second: self.b,
        })
    }

    fn call(&mut self) -> Result<(), EvalError> {
        self.budget.spend(&mut self.steps)?;
        if self.depth >= self.budget.max_depth {
            return Err(EvalError::TooDeep(self.budget.max_depth));
        }
        self.depth += 1;
        let done = self.body();
        self.depth -= 1;
        done
    }

    fn body(&mut self) -> Result<(), EvalError> {
        if self.a.is_zero() {
            self.a = &self.b + 1u32;
            return Ok(());
        }
        if self.b.is_zero() {
            self.a -= 1u32;
            self.b = self.h.clone();
            return self.call();
        }
        let saved = self.a.clone();
        self.b -= 1u32;
        self.call()?;
        if self.feedback == Feedback::Result {
            self.b = self.a.clone();
        }
        self.a = saved - 1u32;
        self.call()
    }
}
