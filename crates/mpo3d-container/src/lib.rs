//! Decoding of multi-picture (MPO) stereo containers.
//!
//! An MPO file is a JPEG whose first image carries an APP2 "MPF" segment
//! indexing the other images appended after it. Stereo cameras store the
//! left and right views this way; [`decode`] returns exactly that pair.
//!
//! All header fields are read through [`ByteReader`], a bounds-checked
//! cursor with explicit endianness.

mod decoder;
mod error;
mod reader;
pub mod synthetic;

pub use decoder::{decode, decode_file, parse_index, MpEntry, MpIndex};
pub use error::ContainerError;
pub use reader::{ByteReader, Endian};
