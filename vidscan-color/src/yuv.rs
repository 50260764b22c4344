//! Planar YUV 4:2:0 -> packed RGBA conversion in fixed point
//!
//! Both entry points share one algorithm: each 2x2 luma block shares a single
//! chroma sample, so the frame is processed row pair by row pair (two luma rows
//! plus one row of each chroma plane). Row pairs are independent and are
//! fanned out across the rayon pool.

use crate::types::{
    BitDepth, ColorRange, ColorStandard, ConvertError, RgbaImage, YuvCoefficients,
};
use rayon::prelude::*;

/// Saturate a fixed-point result to an 8-bit channel
#[inline(always)]
pub fn clip8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Bytes needed for a contiguous `Y | U | V` 4:2:0 frame
pub fn required_len(width: u32, height: u32, depth: BitDepth) -> usize {
    let w = width as usize;
    let h = height as usize;
    (w * h + 2 * (w / 2) * (h / 2)) * depth.bytes_per_sample()
}

/// Convert an 8-bit planar 4:2:0 frame to RGBA
pub fn yuv420p_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    range: ColorRange,
    standard: ColorStandard,
) -> Result<RgbaImage, ConvertError> {
    convert::<U8Samples>(data, width, height, YuvCoefficients::select(range, standard))
}

/// Convert a 10-bit little-endian planar 4:2:0 frame to RGBA
pub fn yuv420p10le_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    range: ColorRange,
    standard: ColorStandard,
) -> Result<RgbaImage, ConvertError> {
    convert::<U16LeSamples>(
        data,
        width,
        height,
        YuvCoefficients::select_10bit(range, standard),
    )
}

/// Sample access for one plane layout
trait SampleFormat {
    const DEPTH: BitDepth;

    fn read(plane: &[u8], index: usize) -> i32;
}

struct U8Samples;

impl SampleFormat for U8Samples {
    const DEPTH: BitDepth = BitDepth::Eight;

    #[inline(always)]
    fn read(plane: &[u8], index: usize) -> i32 {
        plane[index] as i32
    }
}

struct U16LeSamples;

impl SampleFormat for U16LeSamples {
    const DEPTH: BitDepth = BitDepth::Ten;

    #[inline(always)]
    fn read(plane: &[u8], index: usize) -> i32 {
        u16::from_le_bytes([plane[index * 2], plane[index * 2 + 1]]) as i32
    }
}

fn check_geometry(
    data: &[u8],
    width: u32,
    height: u32,
    depth: BitDepth,
) -> Result<usize, ConvertError> {
    let required = required_len(width, height, depth);
    let valid = width > 0
        && height > 0
        && width % 2 == 0
        && height % 2 == 0
        && data.len() >= required;

    if !valid {
        return Err(ConvertError::InvalidFrameGeometry {
            width,
            height,
            len: data.len(),
            required,
        });
    }
    Ok(required)
}

fn convert<S: SampleFormat>(
    data: &[u8],
    width: u32,
    height: u32,
    coeffs: YuvCoefficients,
) -> Result<RgbaImage, ConvertError> {
    check_geometry(data, width, height, S::DEPTH)?;

    let bps = S::DEPTH.bytes_per_sample();
    let w = width as usize;
    let h = height as usize;
    let chroma_w = w / 2;

    let y_size = w * h * bps;
    let c_size = chroma_w * (h / 2) * bps;
    let y_plane = &data[..y_size];
    let u_plane = &data[y_size..y_size + c_size];
    let v_plane = &data[y_size + c_size..y_size + 2 * c_size];

    let y_row = w * bps;
    let c_row = chroma_w * bps;
    let out_row = w * 4;

    let mut image = RgbaImage::new(width, height);

    image
        .data
        .par_chunks_mut(out_row * 2)
        .enumerate()
        .for_each(|(pair, out)| {
            let luma0 = &y_plane[2 * pair * y_row..(2 * pair + 1) * y_row];
            let luma1 = &y_plane[(2 * pair + 1) * y_row..(2 * pair + 2) * y_row];
            let u_row = &u_plane[pair * c_row..(pair + 1) * c_row];
            let v_row = &v_plane[pair * c_row..(pair + 1) * c_row];
            let (out0, out1) = out.split_at_mut(out_row);

            for cx in 0..chroma_w {
                let u = S::read(u_row, cx) - coeffs.chroma_mid;
                let v = S::read(v_row, cx) - coeffs.chroma_mid;

                let terms = ChromaTerms {
                    r: coeffs.r_v * v,
                    g: coeffs.g_u * u + coeffs.g_v * v,
                    b: coeffs.b_u * u,
                };

                for x in [cx * 2, cx * 2 + 1] {
                    write_pixel(out0, x, S::read(luma0, x), &terms, &coeffs);
                    write_pixel(out1, x, S::read(luma1, x), &terms, &coeffs);
                }
            }
        });

    Ok(image)
}

struct ChromaTerms {
    r: i32,
    g: i32,
    b: i32,
}

#[inline(always)]
fn write_pixel(out: &mut [u8], x: usize, luma: i32, terms: &ChromaTerms, c: &YuvCoefficients) {
    let base = (luma - c.y_off) * c.y_mul + c.round;
    let px = &mut out[x * 4..x * 4 + 4];
    px[0] = clip8((base + terms.r) >> c.shift);
    px[1] = clip8((base + terms.g) >> c.shift);
    px[2] = clip8((base + terms.b) >> c.shift);
    px[3] = 255;
}
