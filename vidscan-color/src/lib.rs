//! vidscan color - pixel math for decoded frames
//!
//! Pure functions with no I/O:
//! - Planar YUV 4:2:0 (8-bit and 10-bit LE) -> packed RGBA in fixed point
//! - SMPTE ST 2084 (PQ) inverse transfer and BT.2020 luminance
//! - Strided per-frame color and luminance sampling

pub mod pq;
pub mod sampling;
pub mod types;
pub mod yuv;

pub use pq::*;
pub use sampling::*;
pub use types::*;
pub use yuv::*;
