//! Pixel and colorimetry types shared by the conversion engine

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// One packed RGBA pixel
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Packed RGBA image owned by the caller after conversion.
///
/// `data` always holds exactly `width * height` pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) data: Vec<u8>,
}

impl RgbaImage {
    /// Allocate a zeroed image
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
        }
    }

    /// Wrap an existing packed RGBA byte buffer.
    ///
    /// Returns `None` when the buffer does not hold exactly `width * height` pixels.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGBA bytes, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// View the image as pixels
    pub fn pixels(&self) -> &[Rgba] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels()
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Row stride in bytes
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }
}

impl std::fmt::Debug for RgbaImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbaImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Color range enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    /// Broadcast range (16-235 luma at 8 bits)
    #[default]
    Limited,
    /// Full range (0-255 at 8 bits)
    Full,
}

/// Matrix coefficients used to derive RGB from YUV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorStandard {
    /// BT.601 (SD)
    #[default]
    Bt601,
    /// BT.709 (HD)
    Bt709,
}

/// Sample width of a planar frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    /// 10-bit samples stored in little-endian 16-bit units
    Ten,
}

impl BitDepth {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitDepth::Eight => 1,
            BitDepth::Ten => 2,
        }
    }
}

/// Fixed-point YUV -> RGB coefficient record.
///
/// Resolved once per conversion call so the per-pixel loop never branches on
/// range or standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YuvCoefficients {
    pub y_mul: i32,
    pub y_off: i32,
    pub r_v: i32,
    pub g_u: i32,
    pub g_v: i32,
    pub b_u: i32,
    /// Neutral chroma sample value
    pub chroma_mid: i32,
    /// Right shift applied after accumulation
    pub shift: u32,
    /// Rounding bias added before the shift
    pub round: i32,
}

impl YuvCoefficients {
    /// Coefficients for 8-bit samples (8-bit fixed point, shift 8)
    pub const fn select(range: ColorRange, standard: ColorStandard) -> Self {
        let (y_mul, y_off, r_v, g_u, g_v, b_u) = match (range, standard) {
            (ColorRange::Limited, ColorStandard::Bt601) => (298, 16, 409, -100, -208, 516),
            (ColorRange::Limited, ColorStandard::Bt709) => (298, 16, 459, -55, -136, 541),
            (ColorRange::Full, _) => (256, 0, 359, -88, -183, 453),
        };
        Self {
            y_mul,
            y_off,
            r_v,
            g_u,
            g_v,
            b_u,
            chroma_mid: 128,
            shift: 8,
            round: 1 << 7,
        }
    }

    /// Coefficients for 10-bit samples.
    ///
    /// Same 8-bit-scaled magnitudes; the two extra bits of input precision are
    /// removed by the wider final shift.
    pub const fn select_10bit(range: ColorRange, standard: ColorStandard) -> Self {
        let base = Self::select(range, standard);
        Self {
            y_off: base.y_off << 2,
            chroma_mid: 512,
            shift: 10,
            round: 1 << 9,
            ..base
        }
    }

    pub const fn for_depth(depth: BitDepth, range: ColorRange, standard: ColorStandard) -> Self {
        match depth {
            BitDepth::Eight => Self::select(range, standard),
            BitDepth::Ten => Self::select_10bit(range, standard),
        }
    }
}

/// Conversion precondition failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("invalid frame geometry: {width}x{height} with {len} bytes (need even dimensions and at least {required} bytes)")]
    InvalidFrameGeometry {
        width: u32,
        height: u32,
        len: usize,
        required: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coefficient_table() {
        let c = YuvCoefficients::select(ColorRange::Limited, ColorStandard::Bt601);
        assert_eq!((c.y_mul, c.y_off, c.r_v, c.g_u, c.g_v, c.b_u), (298, 16, 409, -100, -208, 516));

        let c = YuvCoefficients::select(ColorRange::Limited, ColorStandard::Bt709);
        assert_eq!((c.y_mul, c.y_off, c.r_v, c.g_u, c.g_v, c.b_u), (298, 16, 459, -55, -136, 541));

        // Full range ignores the standard
        let a = YuvCoefficients::select(ColorRange::Full, ColorStandard::Bt601);
        let b = YuvCoefficients::select(ColorRange::Full, ColorStandard::Bt709);
        assert_eq!(a, b);
        assert_eq!((a.y_mul, a.y_off, a.r_v, a.g_u, a.g_v, a.b_u), (256, 0, 359, -88, -183, 453));
    }

    #[test]
    fn test_10bit_coefficients() {
        let c = YuvCoefficients::select_10bit(ColorRange::Limited, ColorStandard::Bt709);
        assert_eq!(c.y_off, 64);
        assert_eq!(c.chroma_mid, 512);
        assert_eq!(c.shift, 10);
        assert_eq!(c.round, 512);
        assert_eq!(c.r_v, 459);

        let full = YuvCoefficients::select_10bit(ColorRange::Full, ColorStandard::Bt709);
        assert_eq!(full.y_off, 0);
    }

    #[test]
    fn test_rgba_image_views() {
        let mut image = RgbaImage::new(2, 2);
        image.data[4..8].copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(image.pixels().len(), 4);
        assert_eq!(image.pixel(1, 0), Some(Rgba::new(1, 2, 3, 4)));
        assert_eq!(image.pixel(2, 0), None);
        assert!(RgbaImage::from_raw(2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn test_rgba_image_length_always_matches_dimensions() {
        for len in [0usize, 3, 15, 17, 20] {
            assert!(RgbaImage::from_raw(2, 2, vec![0; len]).is_none(), "len {}", len);
        }

        let image = RgbaImage::from_raw(3, 2, vec![7; 24]).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        assert_eq!(image.data().len(), 24);
        assert_eq!(image.pixels().len(), 6);
        assert_eq!(image.clone().into_raw(), vec![7; 24]);
        assert_eq!(crate::sampling::average_color(&image, 1), [7.0, 7.0, 7.0]);
    }
}
