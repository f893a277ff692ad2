//! Core value model for the ebb expression VM
//!
//! This crate holds everything both halves of the pipeline (the SSA compiler
//! and the bytecode interpreter) agree on:
//! - The closed set of literal types and their signature encoding
//! - Callable signatures with a canonical string form
//! - Native-callback attributes
//! - Source locations and structured diagnostics
//! - The IP/CIDR/regular-expression literal payloads

pub mod attribute;
pub mod cidr;
pub mod diagnostics;
pub mod literal;
pub mod location;
pub mod match_class;
pub mod num;
pub mod regexp;
pub mod signature;

pub use attribute::{Attribute, AttributeSet};
pub use cidr::Cidr;
pub use literal::LiteralType;
pub use location::{FilePos, SourceLocation};
pub use match_class::MatchClass;
pub use regexp::{RegExp, RegexpContext};
pub use signature::{Signature, SignatureError};
