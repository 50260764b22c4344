//! SMPTE ST 2084 (PQ) inverse transfer and BT.2020 luminance
//!
//! Inputs must be UNORM PQ code values. Samples that were already
//! gamma/sRGB-decoded produce wrong (but plausible-looking) numbers; this
//! cannot be detected here.

/// ST 2084 `m1`
pub const M1: f64 = 2610.0 / 16384.0;
/// ST 2084 `m2`
pub const M2: f64 = 2523.0 / 32.0;
/// ST 2084 `c1`
pub const C1: f64 = 3424.0 / 4096.0;
/// ST 2084 `c2`
pub const C2: f64 = 2413.0 / 128.0;
/// ST 2084 `c3`
pub const C3: f64 = 2392.0 / 128.0;

/// Absolute luminance of PQ code value 1.0, in nits
pub const PQ_PEAK_NITS: f64 = 10_000.0;

/// BT.2020 luma weights
pub const BT2020_KR: f64 = 0.2627;
pub const BT2020_KG: f64 = 0.6780;
pub const BT2020_KB: f64 = 0.0593;

/// PQ code value `e` in `[0, 1]` to absolute luminance in nits
pub fn st2084_eotf(e: f64) -> f64 {
    let p = e.powf(1.0 / M2);
    let num = (p - C1).max(0.0);
    let den = C2 - C3 * p;

    // Degenerate near e == 1 (den -> 0) and at the black end (num == 0)
    if den <= 0.0 || num <= 0.0 {
        return if e >= 1.0 { PQ_PEAK_NITS } else { 0.0 };
    }

    PQ_PEAK_NITS * (num / den).powf(1.0 / M1)
}

/// Nits of a single 8-bit PQ-encoded channel sample
#[inline]
pub fn channel_nits(sample: u8) -> f64 {
    st2084_eotf(sample as f64 / 255.0)
}

/// Absolute luminance of an 8-bit PQ-encoded RGB pixel
pub fn pq_luminance_nits(r: u8, g: u8, b: u8) -> f64 {
    BT2020_KR * channel_nits(r) + BT2020_KG * channel_nits(g) + BT2020_KB * channel_nits(b)
}
