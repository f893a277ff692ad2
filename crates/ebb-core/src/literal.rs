//! Literal types
//!
//! The closed set of value types a compiled program can produce or consume.
//! Numbers are 64-bit signed integers; strings are arbitrary byte sequences.
//! Four array specializations exist, one per scalar element type, plus an
//! integer pair used by a few builtin signatures.

use std::fmt;

/// The type of a literal value flowing through the IR and the VM stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralType {
    /// No value (function return type only)
    Void,
    /// Boolean, stored as 0/1 integer at runtime
    Boolean,
    /// 64-bit signed integer
    Number,
    /// Immutable byte string
    String,
    /// IPv4 or IPv6 address
    IpAddress,
    /// Network address with prefix length
    Cidr,
    /// Regular expression pattern with compiled matcher
    RegExp,
    /// Reference to a compiled handler by index
    Handler,
    /// Array of Number
    IntArray,
    /// Array of String
    StringArray,
    /// Array of IpAddress
    IpAddrArray,
    /// Array of Cidr
    CidrArray,
    /// Pair of Numbers
    IntPair,
}

impl LiteralType {
    /// Whether this is one of the four array specializations.
    pub fn is_array_type(self) -> bool {
        matches!(
            self,
            LiteralType::IntArray
                | LiteralType::StringArray
                | LiteralType::IpAddrArray
                | LiteralType::CidrArray
        )
    }

    /// Element type of an array type; any non-array type maps to itself.
    pub fn element_type(self) -> LiteralType {
        match self {
            LiteralType::IntArray => LiteralType::Number,
            LiteralType::StringArray => LiteralType::String,
            LiteralType::IpAddrArray => LiteralType::IpAddress,
            LiteralType::CidrArray => LiteralType::Cidr,
            LiteralType::IntPair => LiteralType::Number,
            other => other,
        }
    }

    /// Single-character signature code.
    ///
    /// Primitives are uppercase, arrays of a primitive are the lowercase
    /// letter of their element type, and the integer pair is `a`.
    pub fn signature_code(self) -> char {
        match self {
            LiteralType::Void => 'V',
            LiteralType::Boolean => 'B',
            LiteralType::Number => 'I',
            LiteralType::String => 'S',
            LiteralType::IpAddress => 'P',
            LiteralType::Cidr => 'C',
            LiteralType::RegExp => 'R',
            LiteralType::Handler => 'H',
            LiteralType::IntArray => 'i',
            LiteralType::StringArray => 's',
            LiteralType::IpAddrArray => 'p',
            LiteralType::CidrArray => 'c',
            LiteralType::IntPair => 'a',
        }
    }

    /// Inverse of [`LiteralType::signature_code`].
    pub fn from_signature_code(ch: char) -> Option<LiteralType> {
        match ch {
            'V' => Some(LiteralType::Void),
            'B' => Some(LiteralType::Boolean),
            'I' => Some(LiteralType::Number),
            'S' => Some(LiteralType::String),
            'P' => Some(LiteralType::IpAddress),
            'C' => Some(LiteralType::Cidr),
            'R' => Some(LiteralType::RegExp),
            'H' => Some(LiteralType::Handler),
            'i' => Some(LiteralType::IntArray),
            's' => Some(LiteralType::StringArray),
            'p' => Some(LiteralType::IpAddrArray),
            'c' => Some(LiteralType::CidrArray),
            'a' => Some(LiteralType::IntPair),
            _ => None,
        }
    }
}

impl fmt::Display for LiteralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiteralType::Void => "void",
            LiteralType::Boolean => "bool",
            LiteralType::Number => "int",
            LiteralType::String => "string",
            LiteralType::IpAddress => "IPAddress",
            LiteralType::Cidr => "Cidr",
            LiteralType::RegExp => "RegExp",
            LiteralType::Handler => "HandlerRef",
            LiteralType::IntArray => "IntArray",
            LiteralType::StringArray => "StringArray",
            LiteralType::IpAddrArray => "IPAddrArray",
            LiteralType::CidrArray => "CidrArray",
            LiteralType::IntPair => "IntPair",
        };
        f.write_str(name)
    }
}
