//! Video data types shared by the pipeline stages

use crate::frame_pool::FrameBuffer;
use crate::rational::fps_or_default;
use vidscan_color::{
    yuv420p10le_to_rgba, yuv420p_to_rgba, ColorRange, ColorStandard, ConvertError, RgbaImage,
};

/// Probed properties of the primary video stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Always positive
    pub fps: f64,
}

impl VideoInfo {
    /// Build from probed values, substituting the fallback rate when `fps`
    /// is missing or not positive
    pub fn new(width: u32, height: u32, fps: Option<f64>) -> Self {
        Self {
            width,
            height,
            fps: fps_or_default(fps),
        }
    }
}

/// Raw pixel layout the decoder writes to its output pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    /// Packed 8-bit RGBA
    #[default]
    Rgba,
    /// Planar YUV 4:2:0, 8-bit
    Yuv420p,
    /// Planar YUV 4:2:0, 10-bit in little-endian 16-bit units
    Yuv420p10le,
}

impl PixelLayout {
    /// Name passed to `-pix_fmt`
    pub fn pix_fmt(self) -> &'static str {
        match self {
            PixelLayout::Rgba => "rgba",
            PixelLayout::Yuv420p => "yuv420p",
            PixelLayout::Yuv420p10le => "yuv420p10le",
        }
    }

    /// Calculate frame size in bytes
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            PixelLayout::Rgba => w * h * 4,
            PixelLayout::Yuv420p => w * h + 2 * (w / 2) * (h / 2),
            PixelLayout::Yuv420p10le => 2 * (w * h + 2 * (w / 2) * (h / 2)),
        }
    }

    pub fn is_planar(self) -> bool {
        !matches!(self, PixelLayout::Rgba)
    }
}

impl std::str::FromStr for PixelLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rgba" => Ok(PixelLayout::Rgba),
            "yuv420p" => Ok(PixelLayout::Yuv420p),
            "yuv420p10le" => Ok(PixelLayout::Yuv420p10le),
            other => Err(format!("unsupported pixel layout: {}", other)),
        }
    }
}

/// Output frame dimensions and layout, fixed for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            width,
            height,
            layout,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.layout.frame_size(self.width, self.height)
    }
}

/// One decoded frame held in a pooled buffer.
///
/// Owned by exactly one stage at a time (producer, queue, then one worker).
/// The buffer goes back to the pool when the frame is dropped or released.
#[derive(Debug)]
pub struct PooledFrame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// Presentation time in seconds derived from the index and frame rate
    pub timestamp: f64,
    pub layout: PixelLayout,
    buffer: FrameBuffer,
}

impl PooledFrame {
    pub fn new(
        index: u64,
        geometry: FrameGeometry,
        timestamp: f64,
        buffer: FrameBuffer,
    ) -> Self {
        debug_assert_eq!(buffer.len(), geometry.frame_size());
        Self {
            index,
            width: geometry.width,
            height: geometry.height,
            timestamp,
            layout: geometry.layout,
            buffer,
        }
    }

    /// Raw frame payload, exactly one frame long
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Convert the payload into a freshly allocated RGBA image.
    ///
    /// `range` and `standard` only apply to planar layouts.
    pub fn to_rgba(
        &self,
        range: ColorRange,
        standard: ColorStandard,
    ) -> Result<RgbaImage, ConvertError> {
        match self.layout {
            PixelLayout::Rgba => RgbaImage::from_raw(self.width, self.height, self.data().to_vec())
                .ok_or(ConvertError::InvalidFrameGeometry {
                    width: self.width,
                    height: self.height,
                    len: self.len(),
                    required: PixelLayout::Rgba.frame_size(self.width, self.height),
                }),
            PixelLayout::Yuv420p => {
                yuv420p_to_rgba(self.data(), self.width, self.height, range, standard)
            }
            PixelLayout::Yuv420p10le => {
                yuv420p10le_to_rgba(self.data(), self.width, self.height, range, standard)
            }
        }
    }

    /// Hand the buffer back to its pool
    pub fn release(self) {
        drop(self);
    }
}
