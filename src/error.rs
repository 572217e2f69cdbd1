//! Error taxonomy. Contract violations (invalid coder ranges, out-of-order
//! context updates, NIL dereferences) are programming errors and panic via
//! `assert!`/`debug_assert!` at the point of violation rather than being
//! threaded through `Result` — see spec section 7. Everything recoverable
//! (truncated input, malformed model files, unknown rule atoms, out of
//! range configuration) is represented here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoderError {
    #[error("input stream truncated before terminal sentinel")]
    Truncated,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("symbol {symbol} is outside alphabet of size {alphabet_size} and growth is disabled")]
    SymbolOutOfRange { symbol: u32, alphabet_size: u32 },
    #[error("requested order {order} exceeds configured maximum order {max_order}")]
    OrderOutOfRange { order: i32, max_order: i32 },
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("unknown rewrite-rule atom prefix '{0}'")]
    UnknownAtom(String),
    #[error("malformed rewrite rule: {0}")]
    Malformed(String),
    #[error("function predicate '{0}' is not registered")]
    UnknownPredicate(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stack_depth must be nonzero in stack(type1) mode")]
    InvalidStackDepth,
    #[error("alphabet size {0} is smaller than the number of reserved model-switch symbols")]
    AlphabetTooSmall(u32),
    #[error("no models configured for transform")]
    NoModels,
}

#[derive(Debug, Error)]
pub enum ScrivenError {
    #[error(transparent)]
    Coder(#[from] CoderError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScrivenError {
    /// Exit-code convention for an external driver: 1 for a fatal
    /// corruption/IO condition, 2 for a caller-supplied bad argument.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScrivenError::Config(_) | ScrivenError::Rule(RuleError::UnknownAtom(_)) => 2,
            _ => 1,
        }
    }
}
