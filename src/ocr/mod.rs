//! Optical character recognition of game text.
//!
//! - `setup`: locating Tesseract (startup precondition)
//! - `preprocess`: thresholding and scaling for the game's font
//! - `engine`: the `TextReader` seam and its Tesseract implementation
//! - `parse`: numbers, suffixed values and progress counters from raw text

pub mod engine;
pub mod parse;
pub mod preprocess;
pub mod setup;

pub use engine::{PageSegmentation, TesseractReader, TextReader};
pub use parse::{parse_integer, parse_number, parse_progress};
pub use preprocess::Preprocess;
pub use setup::{ensure_tesseract, TesseractPaths};
