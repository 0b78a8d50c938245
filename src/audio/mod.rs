//! Audio container handling.

pub mod wav;

pub use wav::{PcmBuffer, WavFormat};
