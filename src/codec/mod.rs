//! Encoding/decoding between bytes, lines and values
//!
//! Separates encoding concerns from transport and protocol logic:
//! - **Line codec**: how protocol lines are cut from and put on the byte stream
//! - **Value transcoder**: how feature values map to wire tokens

pub mod line;
pub mod value;

pub use line::{LineCodec, Lines};
pub use value::Value;
