//! The arithmetic coder (spec section 4.2): a carry-free range coder with
//! renormalisation and follow-bit accounting, plus a binary specialisation
//! used by binary-PPM models. `Coder` holds the shared (L, R, follow, V)
//! state; `Encoder`/`Decoder` wrap it with the direction-specific bit
//! stream, mirroring the teacher's split `Encoder`/`Decoder` structs.

use crate::bitio::{BitReader, BitWriter};
use crate::constant::{CODE_BITS, FOLLOW_BIT_CAP, HALF, QUARTER};
use crate::error::CoderError;

#[cfg(not(feature = "soft-div"))]
#[inline]
fn divide(num: u32, den: u32) -> u32 {
    num / den
}

/// Shift-and-add division, bit-identical to `num / den` for den > 0.
/// Used when the coder must avoid a hardware divide instruction.
#[cfg(feature = "soft-div")]
fn divide(num: u32, den: u32) -> u32 {
    if den == 0 {
        return 0;
    }
    let mut quotient: u32 = 0;
    let mut remainder: u32 = 0;
    for i in (0..32).rev() {
        remainder <<= 1;
        remainder |= (num >> i) & 1;
        if remainder >= den {
            remainder -= den;
            quotient |= 1 << i;
        }
    }
    quotient
}

/// Shared (L, R) range-coder state. `v` is only meaningful in decode mode,
/// where it holds the CODE_BITS-bit sliding window of input bits and is
/// retained across internal coder restarts triggered by the follow-bit cap.
#[derive(Debug, Clone)]
pub struct Coder {
    l: u32,
    r: u32,
    follow: u32,
    v: Option<u32>,
}

impl Default for Coder {
    fn default() -> Coder {
        Coder { l: 0, r: HALF - 1, follow: 0, v: None }
    }
}

impl Coder {
    pub fn new() -> Coder {
        Coder::default()
    }

    pub fn low(&self) -> u32 {
        self.l
    }
    pub fn range(&self) -> u32 {
        self.r
    }

    /// start_encode / start_decode: reset (L, R, follow). V is left alone
    /// so decode can be restarted internally without losing its place in
    /// the input.
    fn reset(&mut self) {
        self.l = 0;
        self.r = HALF - 1;
        self.follow = 0;
    }

    fn emit_with_follow(bw: &mut BitWriter, follow: &mut u32, bit: u32) {
        bw.push_bit(bit);
        while *follow > 0 {
            bw.push_bit(1 - bit);
            *follow -= 1;
        }
    }

    /// Renormalise after an encode, possibly triggering a follow-bit-cap
    /// self-resync (finish + restart the segment).
    fn renorm_encode(&mut self, bw: &mut BitWriter) {
        while self.r < QUARTER {
            if self.l >= HALF {
                Self::emit_with_follow(bw, &mut self.follow, 1);
                self.l -= HALF;
            } else if self.l + self.r <= HALF {
                Self::emit_with_follow(bw, &mut self.follow, 0);
            } else {
                self.follow += 1;
                self.l -= QUARTER;
            }
            self.l <<= 1;
            self.r <<= 1;
        }
        if self.follow >= FOLLOW_BIT_CAP {
            log::warn!("coder follow-bit run hit cap {FOLLOW_BIT_CAP}, resynchronising");
            self.finish_encode(bw);
            self.reset();
        }
    }

    /// Mirrors `renorm_encode`'s affine map on `L` onto `V` in lockstep,
    /// so `V - L` stays correct through every straddle step, and resets
    /// `follow` on each definite bit exactly as `emit_with_follow` drains
    /// it on encode, so the follow-bit-cap resync fires at the same point
    /// on both sides. Past the end of the input, missing bits are read as
    /// zero: the stream's trailing padding (and any bits beyond the
    /// terminal sentinel) is never a truncation.
    fn renorm_decode(&mut self, br: &mut BitReader) {
        while self.r < QUARTER {
            let mut v = self.v.expect("decode started");
            if self.l >= HALF {
                self.l -= HALF;
                v = v.wrapping_sub(HALF);
                self.follow = 0;
            } else if self.l + self.r <= HALF {
                self.follow = 0;
            } else {
                self.follow += 1;
                self.l -= QUARTER;
                v = v.wrapping_sub(QUARTER);
            }
            self.l <<= 1;
            self.r <<= 1;
            let bit = br.next_bit_or_zero();
            self.v = Some((v << 1) | bit);
        }
        if self.follow >= FOLLOW_BIT_CAP {
            self.finish_decode(br);
            br.align_to_byte();
            self.reset();
        }
    }

    /// encode(l, h, t): 0 <= l < h <= t <= 2^31-ish. Fatal contract
    /// violation if l >= h or h > t.
    pub fn encode(&mut self, bw: &mut BitWriter, l: u32, h: u32, t: u32) {
        assert!(l < h && h <= t, "invalid coder range: l={l} h={h} t={t}");
        let r = divide(self.r, t);
        self.l = self.l.wrapping_add(r * l);
        if h < t {
            self.r = r * (h - l);
        } else {
            self.r -= r * l;
        }
        self.renorm_encode(bw);
    }

    pub fn decode_target(&self, t: u32) -> u32 {
        let v = self.v.expect("decode started");
        let num = v.wrapping_sub(self.l) as u64 * t as u64;
        let target = (num / self.r as u64) as u32;
        target.min(t - 1)
    }

    pub fn decode(&mut self, br: &mut BitReader, l: u32, h: u32, t: u32) -> Result<(), CoderError> {
        assert!(l < h && h <= t, "invalid coder range: l={l} h={h} t={t}");
        let r = divide(self.r, t);
        self.l = self.l.wrapping_add(r * l);
        if h < t {
            self.r = r * (h - l);
        } else {
            self.r -= r * l;
        }
        self.renorm_decode(br);
        Ok(())
    }

    pub fn start_encode(&mut self) {
        self.reset();
    }

    pub fn finish_encode(&mut self, bw: &mut BitWriter) {
        let mut v = self.l.wrapping_add(self.r / 2);
        let mut r = self.r;
        for _ in 0..3 {
            if v >= HALF {
                Self::emit_with_follow(bw, &mut self.follow, 1);
                v = v.wrapping_sub(HALF);
            } else if v.wrapping_add(r) <= HALF {
                Self::emit_with_follow(bw, &mut self.follow, 0);
            } else {
                self.follow += 1;
                v = v.wrapping_sub(QUARTER);
            }
            v <<= 1;
            r <<= 1;
        }
        bw.flush();
    }

    /// Primes `V` with the stream's first CODE_BITS bits, zero-filling
    /// past the end of a short stream (spec section 4.2): decode must
    /// never fail just because the encoded stream was short enough that
    /// the priming window runs past its last byte.
    pub fn start_decode(&mut self, br: &mut BitReader) -> Result<(), CoderError> {
        self.reset();
        if self.v.is_none() {
            let mut v = 0u32;
            for _ in 0..CODE_BITS {
                v = (v << 1) | br.next_bit_or_zero();
            }
            self.v = Some(v);
        }
        Ok(())
    }

    pub fn finish_decode(&mut self, br: &mut BitReader) {
        for _ in 0..3 {
            let bit = br.next_bit_or_zero();
            let v = self.v.expect("decode started");
            self.v = Some((v << 1) | bit);
        }
    }

    /// Binary specialisation (spec 4.2): c0/c1 are the counts for symbols
    /// 0 and 1, LPS is whichever has the smaller count.
    pub fn encode_bit(&mut self, bw: &mut BitWriter, c0: u32, c1: u32, bit: u32) {
        debug_assert!(bit == 0 || bit == 1);
        let total = c0 + c1;
        let r = divide(self.r, total);
        let (lps, c_lps) = if c0 <= c1 { (0u32, c0) } else { (1u32, c1) };
        let r_lps = r * c_lps;
        if bit == lps {
            self.l = self.l.wrapping_add(self.r - r_lps);
            self.r = r_lps;
        } else {
            self.r -= r_lps;
        }
        self.renorm_encode(bw);
    }

    pub fn decode_bit(&mut self, br: &mut BitReader, c0: u32, c1: u32) -> Result<u32, CoderError> {
        let total = c0 + c1;
        let r = divide(self.r, total);
        let (lps, c_lps) = if c0 <= c1 { (0u32, c0) } else { (1u32, c1) };
        let r_lps = r * c_lps;
        let v = self.v.expect("decode started");
        let bit = if v.wrapping_sub(self.l) >= self.r - r_lps { lps } else { 1 - lps };
        if bit == lps {
            self.l = self.l.wrapping_add(self.r - r_lps);
            self.r = r_lps;
        } else {
            self.r -= r_lps;
        }
        self.renorm_decode(br);
        Ok(bit)
    }
}
