//! Callable signatures
//!
//! A signature is a name, an ordered parameter list and a return type, with a
//! canonical one-letter-per-type string encoding such as `exit(I)V` or
//! `callproc(Bs)I`. The encoding is the identity for equality, ordering and
//! linker lookup.

use crate::literal::LiteralType;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a signature string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// A type code outside the known alphabet
    #[error("unknown type code {0:?} in signature")]
    UnknownTypeCode(char),

    /// Input ended before the return type was seen
    #[error("premature end of signature string: {0:?}")]
    PrematureEnd(String),

    /// Input continued past the return type
    #[error("garbage at end of signature string: {0:?}")]
    TrailingGarbage(String),
}

/// A typed callable signature.
///
/// Grammar: `NAME '(' type* ')' returnType` with the one-letter codes of
/// [`LiteralType::signature_code`].
#[derive(Debug, Clone, Default)]
pub struct Signature {
    name: String,
    return_type: Option<LiteralType>,
    args: Vec<LiteralType>,
}

impl Signature {
    /// Creates a signature with the given name, void return and no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: None,
            args: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn return_type(&self) -> LiteralType {
        self.return_type.unwrap_or(LiteralType::Void)
    }

    pub fn set_return_type(&mut self, ty: LiteralType) {
        self.return_type = Some(ty);
    }

    pub fn args(&self) -> &[LiteralType] {
        &self.args
    }

    pub fn set_args(&mut self, args: Vec<LiteralType>) {
        self.args = args;
    }

    pub fn push_arg(&mut self, ty: LiteralType) {
        self.args.push(ty);
    }

    /// The canonical string encoding.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.name.len() + self.args.len() + 3);
        out.push_str(&self.name);
        out.push('(');
        for arg in &self.args {
            out.push(arg.signature_code());
        }
        out.push(')');
        out.push(self.return_type().signature_code());
        out
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        enum State {
            Name,
            Args,
            ReturnType,
            End,
        }

        let mut sig = Signature::default();
        let mut state = State::Name;
        let mut name_end = 0;

        for (at, ch) in input.char_indices() {
            match state {
                State::Name => {
                    if ch == '(' {
                        name_end = at;
                        state = State::Args;
                    }
                }
                State::Args => {
                    if ch == ')' {
                        state = State::ReturnType;
                    } else {
                        let ty = LiteralType::from_signature_code(ch)
                            .ok_or(SignatureError::UnknownTypeCode(ch))?;
                        sig.args.push(ty);
                    }
                }
                State::ReturnType => {
                    let ty = LiteralType::from_signature_code(ch)
                        .ok_or(SignatureError::UnknownTypeCode(ch))?;
                    sig.return_type = Some(ty);
                    state = State::End;
                }
                State::End => {
                    return Err(SignatureError::TrailingGarbage(input.to_string()));
                }
            }
        }

        if !matches!(state, State::End) {
            return Err(SignatureError::PrematureEnd(input.to_string()));
        }

        sig.name = input[..name_end].to_string();
        Ok(sig)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

impl Eq for Signature {}

impl std::hash::Hash for Signature {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.encode().hash(state);
    }
}

impl PartialOrd for Signature {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Signature {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.encode().cmp(&other.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reencode_identity() {
        for text in ["exit(I)V", "callproc(Bs)I", "log(S)V", "f()B", "pair(a)a"] {
            let sig: Signature = text.parse().unwrap();
            assert_eq!(sig.encode(), text);
        }
    }

    #[test]
    fn test_parse_components() {
        let sig: Signature = "callproc(Bs)I".parse().unwrap();
        assert_eq!(sig.name(), "callproc");
        assert_eq!(sig.return_type(), LiteralType::Number);
        assert_eq!(
            sig.args(),
            &[LiteralType::Boolean, LiteralType::StringArray]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "f(".parse::<Signature>(),
            Err(SignatureError::PrematureEnd("f(".into()))
        );
        assert_eq!(
            "f()Vx".parse::<Signature>(),
            Err(SignatureError::TrailingGarbage("f()Vx".into()))
        );
        assert_eq!(
            "f(Z)V".parse::<Signature>(),
            Err(SignatureError::UnknownTypeCode('Z'))
        );
    }

    #[test]
    fn test_equality_is_on_encoding() {
        let mut a = Signature::new("f");
        a.set_return_type(LiteralType::Void);
        let b: Signature = "f()V".parse().unwrap();
        assert_eq!(a, b);
    }
}
