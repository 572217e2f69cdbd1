use std::fmt;

/// Bit width of the coder's (L, R) registers.
pub const CODE_BITS: u32 = 32;
pub const HALF: u32 = 1 << 31;
pub const QUARTER: u32 = 1 << 30;

/// Cap on a follow-bit run before the coder self-resynchronises by
/// finishing the current segment and starting a fresh one. See
/// coder::Coder::renorm_encode.
pub const FOLLOW_BIT_CAP: u32 = 256;

/// Reserved symbol denoting end-of-sequence, model-switch marker, and
/// structural separator.
pub const SENTINEL: u32 = u32::MAX - 1;
/// Reserved symbol used internally by the text table to escape
/// multi-symbol keys.
pub const SENTINEL1: u32 = u32::MAX - 2;

/// Largest symbol value a model may ever hold.
pub const MAX_SYMBOL: u32 = (1u32 << 31) - 3;

/// Frequency cap before a model's counts are rescaled.
pub const MAX_FREQUENCY: u32 = 1 << 27;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}
impl Version {
    pub fn current() -> Version {
        Version { major: 0, minor: 1, patch: 0 }
    }
}
impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}
