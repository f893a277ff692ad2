//! CIDR network notation
//!
//! An address plus prefix length, with masking containment tests. Both
//! families round-trip through the standard presentation form `addr/prefix`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a CIDR string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidrParseError {
    #[error("missing '/' separator in {0:?}")]
    MissingSeparator(String),

    #[error("invalid address part: {0}")]
    InvalidAddress(String),

    #[error("invalid prefix length: {0}")]
    InvalidPrefix(String),

    #[error("prefix length {prefix} out of range for the address family (max {max})")]
    PrefixOutOfRange { prefix: u8, max: u8 },
}

/// A network in CIDR notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cidr {
    address: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn new(address: IpAddr, prefix: u8) -> Self {
        Self { address, prefix }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Tests whether the given address lies inside this network.
    ///
    /// Addresses of the other family are never contained.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.address, addr) {
            (IpAddr::V4(net), IpAddr::V4(probe)) => {
                let mask = prefix_mask_v4(self.prefix);
                u32::from(net) & mask == u32::from(*probe) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(probe)) => {
                let mask = prefix_mask_v6(self.prefix);
                u128::from(net) & mask == u128::from(*probe) & mask
            }
            _ => false,
        }
    }
}

impl Default for Cidr {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    }
}

fn prefix_mask_v4(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n.min(32))),
    }
}

fn prefix_mask_v6(prefix: u8) -> u128 {
    match prefix {
        0 => 0,
        n => u128::MAX << (128 - u32::from(n.min(128))),
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = CidrParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = input
            .split_once('/')
            .ok_or_else(|| CidrParseError::MissingSeparator(input.to_string()))?;

        let address: IpAddr = addr
            .parse()
            .map_err(|_| CidrParseError::InvalidAddress(addr.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CidrParseError::InvalidPrefix(prefix.to_string()))?;

        let max = if address.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(CidrParseError::PrefixOutOfRange { prefix, max });
        }

        Ok(Self::new(address, prefix))
    }
}
