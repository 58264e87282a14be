//! Function-signature model and parser for the Flint Interop Protocol.
//!
//! Turns source-level declarations such as `scale(f64, f32) -> f64` into the
//! fixed-width typed shape carried on the wire.

pub mod error;
pub mod parser;
pub mod types;

pub use crate::error::{Result, SignatureError};
pub use crate::parser::{parse_function_signature, parse_type_token};
pub use crate::types::{
    FixedStr, FunctionSignature, MAX_SIGNATURE_ENTRIES, NAME_FIELD_LEN, PrimitiveType,
    SignatureList, SymbolName, TypeSignature,
};
