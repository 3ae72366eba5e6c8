use std::fmt;

use log::trace;
use num::{BigInt, BigUint, Zero};

use crate::error::EvalError;

pub const DEFAULT_MAX_STEPS: u64 = 50_000_000;
pub const DEFAULT_MAX_DEPTH: usize = 1_000_000;

/// Limits on a single exact evaluation. Exhausting either one turns the
/// evaluation into an error; it never changes a result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Budget {
    pub max_steps: u64,
    pub max_depth: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Budget {
            max_steps: DEFAULT_MAX_STEPS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Budget {
    pub fn spend(&self, steps: &mut u64) -> Result<(), EvalError> {
        *steps += 1;
        if *steps > self.max_steps {
            return Err(EvalError::BudgetExhausted(self.max_steps));
        }
        Ok(())
    }
}

/// Final contents of the two registers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pair {
    pub first: BigUint,
    pub second: BigUint,
}

impl Pair {
    pub fn base(b: BigUint) -> Self {
        Pair {
            first: &b + 1u32,
            second: b,
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

pub fn non_negative(name: &'static str, value: &BigInt) -> Result<BigUint, EvalError> {
    value.to_biguint().ok_or_else(|| EvalError::Negative {
        name,
        value: value.clone(),
    })
}

/// The two-register function. Exhausting `b` reseeds it with `h`; otherwise the
/// second register left behind by `(a, b - 1)` becomes the argument of `a - 1`.
///
/// Runs on an explicit stack of pending `a` values with `b` as a single
/// register, so the depth of the native stack stays constant.
pub fn evaluate(a: &BigUint, b: &BigUint, h: &BigUint, budget: Budget) -> Result<Pair, EvalError> {
    let mut pending = vec![a.clone()];
    let mut b = b.clone();
    let mut steps = 0;
    while let Some(a) = pending.pop() {
        budget.spend(&mut steps)?;
        if a.is_zero() {
            // (b + 1, b): the second register is untouched
            continue;
        }
        if b.is_zero() {
            pending.push(a - 1u32);
            b = h.clone();
        } else {
            pending.push(&a - 1u32);
            pending.push(a);
            b -= 1u32;
        }
    }
    trace!("evaluate finished in {} steps", steps);
    // the last frame popped is always a base case
    Ok(Pair::base(b))
}

/// Ackermann's recursion with `h` as the reseed value: `nested(a, 0) = nested(a - 1, h)`
/// and `nested(a, b) = nested(a - 1, nested(a, b - 1))`. With `h = 1` this is
/// the classic function.
pub fn nested(a: &BigUint, b: &BigUint, h: &BigUint, budget: Budget) -> Result<BigUint, EvalError> {
    let mut pending = vec![a.clone()];
    let mut value = b.clone();
    let mut steps = 0;
    while let Some(a) = pending.pop() {
        budget.spend(&mut steps)?;
        if a.is_zero() {
            value += 1u32;
        } else if value.is_zero() {
            pending.push(a - 1u32);
            value = h.clone();
        } else {
            pending.push(&a - 1u32);
            pending.push(a);
            value -= 1u32;
        }
    }
    trace!("nested finished in {} steps", steps);
    Ok(value)
}

pub const MAX_WORD: u64 = 1 << 16;

/// The nested recursion the way the obfuscated machine runs it: every
/// intermediate value wraps at `word`. Results are memoized on `(a, b)`, so a
/// `Machine` is only valid for the `h` it was built with.
///
/// Each frame costs one step of the budget and each memo row costs `word`
/// steps, so a large `a` runs out of budget before it runs out of memory.
pub struct Machine {
    word: u32,
    h: u32,
    budget: Budget,
    steps: u64,
    memo: Vec<Vec<Option<u32>>>,
}

impl Machine {
    pub fn new(word: u64, h: u64, budget: Budget) -> Result<Self, EvalError> {
        if word == 0 {
            return Err(EvalError::ZeroModulus);
        }
        if word > MAX_WORD {
            return Err(EvalError::MachineWord(word));
        }
        let word = word as u32;
        Ok(Machine {
            word,
            h: (h % u64::from(word)) as u32,
            budget,
            steps: 0,
            memo: Vec::new(),
        })
    }

    fn get(&self, a: u32, b: u32) -> Option<u32> {
        self.memo.get(a as usize).and_then(|row| row[b as usize])
    }

    fn insert(&mut self, a: u32, b: u32, value: u32) -> Result<(), EvalError> {
        let a = a as usize;
        while self.memo.len() <= a {
            self.steps = self.steps.saturating_add(u64::from(self.word));
            if self.steps > self.budget.max_steps {
                return Err(EvalError::BudgetExhausted(self.budget.max_steps));
            }
            self.memo.push(vec![None; self.word as usize]);
        }
        self.memo[a][b as usize] = Some(value);
        Ok(())
    }

    /// Either the memoized value of `(a, b)` or the frame that has to run first.
    fn lookup(&self, a: u32, b: u32) -> Result<u32, (u32, u32)> {
        self.get(a, b).ok_or((a, b))
    }

    pub fn ack(&mut self, a: u32, b: u64) -> Result<u32, EvalError> {
        let b = (b % u64::from(self.word)) as u32;
        if let Some(v) = self.get(a, b) {
            return Ok(v);
        }
        let mut frames = vec![(a, b)];
        let mut result = 0;
        while let Some(&(a, b)) = frames.last() {
            self.budget.spend(&mut self.steps)?;
            if self.get(a, b).is_some() {
                frames.pop();
                continue;
            }
            let ready = if a == 0 {
                Ok((b + 1) % self.word)
            } else if b == 0 {
                self.lookup(a - 1, self.h)
            } else {
                self.lookup(a, b - 1)
                    .and_then(|inner| self.lookup(a - 1, inner))
            };
            match ready {
                Ok(v) => {
                    self.insert(a, b, v)?;
                    frames.pop();
                    result = v;
                }
                Err(frame) => frames.push(frame),
            }
        }
        trace!("machine finished after {} steps", self.steps);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::BigUint;
    use proptest::prelude::*;

    fn big(n: u64) -> BigUint {
        BigUint::from(n)
    }

    fn pair(first: u64, second: u64) -> Pair {
        Pair {
            first: big(first),
            second: big(second),
        }
    }

    fn eval(a: u64, b: u64, h: u64) -> Pair {
        evaluate(&big(a), &big(b), &big(h), Budget::default()).unwrap()
    }

    fn nest(a: u64, b: u64, h: u64) -> BigUint {
        nested(&big(a), &big(b), &big(h), Budget::default()).unwrap()
    }

    fn classic(m: u64, n: u64) -> u64 {
        match (m, n) {
            (0, n) => n + 1,
            (m, 0) => classic(m - 1, 1),
            (m, n) => classic(m - 1, classic(m, n - 1)),
        }
    }

    proptest! {
        #[test]
        fn base_case(b in 0u64..1_000_000, h in 0u64..1_000_000) {
            prop_assert_eq!(eval(0, b, h), pair(b + 1, b));
        }

        #[test]
        fn exhausted_b_reseeds(a in 1u64..5, h in 0u64..5) {
            prop_assert_eq!(eval(a, 0, h), eval(a - 1, h, h));
        }

        #[test]
        fn inner_second_register_feeds_outer(a in 1u64..5, b in 1u64..5, h in 0u64..5) {
            let inner = eval(a, b - 1, h);
            let outer = evaluate(&big(a - 1), &inner.second, &big(h), Budget::default()).unwrap();
            prop_assert_eq!(eval(a, b, h), outer);
        }

        #[test]
        fn one_one(h in 0u64..1_000_000) {
            prop_assert_eq!(eval(1, 1, h), pair(h + 1, h));
        }
    }

    #[test]
    fn two_zero_three() {
        assert_eq!(eval(2, 0, 3), eval(1, 3, 3));
    }

    #[test]
    fn huge_arguments_stay_exact() {
        let b = BigUint::from(u64::MAX) * 4u32;
        let got = evaluate(&BigUint::zero(), &b, &big(7), Budget::default()).unwrap();
        assert_eq!(got.first, &b + 1u32);
    }

    #[test]
    fn nested_reseed_one_is_classic() {
        for m in 0..4 {
            for n in 0..5 {
                assert_eq!(nest(m, n, 1), big(classic(m, n)), "A({}, {})", m, n);
            }
        }
    }

    #[test]
    fn nested_reseed_zero_counts() {
        for a in 0..6 {
            assert_eq!(nest(a, 9, 0), big(10));
        }
    }

    #[test]
    fn budget_is_enforced() {
        let tight = Budget {
            max_steps: 1_000,
            ..Budget::default()
        };
        assert_eq!(
            nested(&big(4), &big(1), &big(2), tight),
            Err(EvalError::BudgetExhausted(1_000))
        );
        assert!(evaluate(&big(4), &big(1), &big(1_000), tight).is_err());
    }

    #[test]
    fn negative_input_is_a_domain_error() {
        let err = non_negative("h", &BigInt::from(-3)).unwrap_err();
        assert_eq!(
            err,
            EvalError::Negative {
                name: "h",
                value: BigInt::from(-3)
            }
        );
        assert_eq!(non_negative("h", &BigInt::from(3)), Ok(big(3)));
    }

    #[test]
    fn machine_matches_exact_until_it_wraps() {
        for h in 0..4 {
            let mut machine = Machine::new(32768, h, Budget::default()).unwrap();
            for a in 0..4 {
                for b in 0..4 {
                    assert_eq!(
                        BigUint::from(machine.ack(a, b).unwrap()),
                        nest(u64::from(a), b, h),
                        "({}, {}, {})",
                        a,
                        b,
                        h
                    );
                }
            }
        }
    }

    #[test]
    fn machine_wraps_every_step() {
        // classic A(3, 3) = 61, but with 5-bit words 61 never appears
        let mut machine = Machine::new(32, 1, Budget::default()).unwrap();
        assert!(machine.ack(3, 3).unwrap() < 32);
        assert_eq!(machine.ack(1, 40), Ok((8 + 2) % 32));
    }

    #[test]
    fn machine_word_limits() {
        assert_eq!(Machine::new(0, 1, Budget::default()).err(), Some(EvalError::ZeroModulus));
        assert_eq!(
            Machine::new(MAX_WORD + 1, 1, Budget::default()).err(),
            Some(EvalError::MachineWord(MAX_WORD + 1))
        );
    }

    #[test]
    fn machine_rows_are_charged_to_the_budget() {
        // a hundred thousand rows of 32768 entries would be tens of gigabytes
        let budget = Budget {
            max_steps: 5_000_000,
            ..Budget::default()
        };
        let mut machine = Machine::new(32768, 3, budget).unwrap();
        assert_eq!(machine.ack(100_000, 1), Err(EvalError::BudgetExhausted(5_000_000)));

        let tight = Budget {
            max_steps: 100,
            ..Budget::default()
        };
        let mut machine = Machine::new(16, 1, tight).unwrap();
        assert_eq!(machine.ack(20, 1), Err(EvalError::BudgetExhausted(100)));
    }
}
