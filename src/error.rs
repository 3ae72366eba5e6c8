use num::BigInt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("{name} must be a non-negative integer, got {value}")]
    Negative { name: &'static str, value: BigInt },
    #[error("evaluation gave up after {0} steps")]
    BudgetExhausted(u64),
    #[error("register recursion went deeper than {0} frames")]
    TooDeep(usize),
    #[error("exact value would need more than {0} bits")]
    TooLarge(u64),
    #[error("no closed form is derived for a = {0}")]
    Unsupported(u64),
    #[error("intermediate modulus no longer fits in 64 bits")]
    ModulusOverflow,
    #[error("modulus must be positive")]
    ZeroModulus,
    #[error("machine words are at most 16 bits, got modulus {0}")]
    MachineWord(u64),
    #[error("search interrupted after {0} candidates")]
    Interrupted(u64),
}

impl EvalError {
    /// The input is fine but too big for this evaluator; another one may still answer.
    pub fn is_out_of_reach(&self) -> bool {
        matches!(
            self,
            EvalError::BudgetExhausted(_)
                | EvalError::TooDeep(_)
                | EvalError::TooLarge(_)
                | EvalError::Unsupported(_)
                | EvalError::ModulusOverflow
        )
    }
}
