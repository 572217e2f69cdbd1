//! Symbols (spec section 3): non-negative integers up to `MAX_SYMBOL`,
//! with two reserved values threaded through every component below.

use crate::constant::{MAX_SYMBOL, SENTINEL, SENTINEL1};

pub type Symbol = u32;

/// True for any symbol a model or text may legally hold, reserved values
/// included.
pub fn is_valid(sym: Symbol) -> bool {
    sym <= MAX_SYMBOL || sym == SENTINEL || sym == SENTINEL1
}

/// True for an ordinary (non-reserved) symbol — the kind a model counts
/// and an alphabet grows to admit.
pub fn is_ordinary(sym: Symbol) -> bool {
    sym <= MAX_SYMBOL
}

pub fn is_sentinel(sym: Symbol) -> bool {
    sym == SENTINEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_values_are_valid_but_not_ordinary() {
        assert!(is_valid(SENTINEL));
        assert!(!is_ordinary(SENTINEL));
        assert!(is_valid(SENTINEL1));
        assert!(!is_ordinary(SENTINEL1));
    }

    #[test]
    fn ordinary_symbols_below_cap_are_valid() {
        assert!(is_valid(0));
        assert!(is_valid(MAX_SYMBOL));
        assert!(is_ordinary(MAX_SYMBOL));
    }
}
