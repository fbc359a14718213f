//! Neural network building blocks of the DAC encoder.
//!
//! Weights are folded and loaded once; every block runs either padded (one pass
//! over a whole file) or unpadded (windowed compression with explicit context).

pub mod conv;
pub mod encoder;
pub mod quantizer;
pub mod snake;
