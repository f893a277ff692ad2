//! Native-callback attributes

use std::fmt;

/// Behavioral attribute of a native callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Attribute {
    /// Implementation is experimental; frontends may warn on use.
    Experimental = 0x01,
    /// Implementation never returns to program code.
    NoReturn = 0x02,
    /// Implementation is free of side effects; unused results may be dropped.
    SideEffectFree = 0x04,
}

/// A small set of [`Attribute`] flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeSet(u8);

impl AttributeSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, attr: Attribute) {
        self.0 |= attr as u8;
    }

    pub fn contains(self, attr: Attribute) -> bool {
        self.0 & attr as u8 != 0
    }

    pub fn with(mut self, attr: Attribute) -> Self {
        self.insert(attr);
        self
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (attr, name) in [
            (Attribute::Experimental, "experimental"),
            (Attribute::NoReturn, "noreturn"),
            (Attribute::SideEffectFree, "side-effect-free"),
        ] {
            if self.contains(attr) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
