//! Frame-rate string parsing

/// Fallback rate numerator (NTSC film, 23.976 fps).
///
/// Used whenever the prober reports no usable rate; per-frame timestamps need
/// a non-zero rate and film cadence is the most common source material.
pub const DEFAULT_FPS_NUM: u32 = 24000;
/// Fallback rate denominator
pub const DEFAULT_FPS_DEN: u32 = 1001;

/// `DEFAULT_FPS_NUM / DEFAULT_FPS_DEN` as a float
pub const DEFAULT_FPS: f64 = DEFAULT_FPS_NUM as f64 / DEFAULT_FPS_DEN as f64;

/// Parse `"num/den"` (or a plain decimal) into a ratio.
///
/// Returns `None` for a zero denominator, non-finite values or malformed input.
pub fn parse_rational(s: &str) -> Option<f64> {
    let s = s.trim();
    let value = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };

    value.is_finite().then_some(value)
}

/// Substitute the fallback rate for missing or non-positive values
pub fn fps_or_default(fps: Option<f64>) -> f64 {
    match fps {
        Some(fps) if fps > 0.0 => fps,
        _ => DEFAULT_FPS,
    }
}
