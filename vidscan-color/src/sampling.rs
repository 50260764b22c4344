//! Per-frame color and luminance sampling over a strided pixel grid

use crate::pq::pq_luminance_nits;
use crate::types::RgbaImage;

/// Luminance summary of one PQ-encoded frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LuminanceStats {
    pub max_nits: f64,
    pub avg_nits: f64,
    pub samples: usize,
}

fn sample_grid(image: &RgbaImage, step: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
    let step = step.max(1) as usize;
    (0..image.height)
        .step_by(step)
        .flat_map(move |y| (0..image.width).step_by(step).map(move |x| (x, y)))
}

/// Mean RGB over every `step`-th pixel in both directions.
///
/// An empty image yields black.
pub fn average_color(image: &RgbaImage, step: u32) -> [f64; 3] {
    let pixels = image.pixels();
    let width = image.width as usize;
    let mut sum = [0u64; 3];
    let mut count = 0u64;

    for (x, y) in sample_grid(image, step) {
        let px = pixels[y as usize * width + x as usize];
        sum[0] += px.r as u64;
        sum[1] += px.g as u64;
        sum[2] += px.b as u64;
        count += 1;
    }

    if count == 0 {
        return [0.0; 3];
    }
    sum.map(|s| s as f64 / count as f64)
}

/// PQ luminance statistics over every `step`-th pixel.
///
/// The image must hold PQ-encoded (not display-decoded) RGB.
pub fn luminance_stats(image: &RgbaImage, step: u32) -> LuminanceStats {
    let pixels = image.pixels();
    let width = image.width as usize;
    let mut stats = LuminanceStats::default();
    let mut total = 0.0;

    for (x, y) in sample_grid(image, step) {
        let px = pixels[y as usize * width + x as usize];
        let nits = pq_luminance_nits(px.r, px.g, px.b);
        stats.max_nits = stats.max_nits.max(nits);
        total += nits;
        stats.samples += 1;
    }

    if stats.samples > 0 {
        stats.avg_nits = total / stats.samples as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_from(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 4]) -> RgbaImage {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        RgbaImage::from_raw(width, height, data).unwrap()
    }

    #[test]
    fn test_average_color_flat() {
        let image = image_from(8, 4, |_, _| [10, 20, 30, 255]);
        assert_eq!(average_color(&image, 1), [10.0, 20.0, 30.0]);
        assert_eq!(average_color(&image, 3), [10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_average_color_step_zero_is_dense() {
        let image = image_from(2, 1, |x, _| if x == 0 { [0, 0, 0, 255] } else { [100, 100, 100, 255] });
        assert_eq!(average_color(&image, 0), [50.0, 50.0, 50.0]);
        // Step 2 only visits column 0
        assert_eq!(average_color(&image, 2), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_average_color_empty() {
        let image = RgbaImage::new(0, 0);
        assert_eq!(average_color(&image, 1), [0.0; 3]);
        assert_eq!(luminance_stats(&image, 1), LuminanceStats::default());
    }

    #[test]
    fn test_luminance_stats() {
        let image = image_from(4, 4, |x, y| {
            if x == 3 && y == 3 {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        });

        let stats = luminance_stats(&image, 1);
        assert_eq!(stats.samples, 16);
        assert!((stats.max_nits - 10_000.0).abs() < 1e-6);
        assert!((stats.avg_nits - 10_000.0 / 16.0).abs() < 1e-6);
    }
}
