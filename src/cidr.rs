//! IPv4 CIDR block arithmetic for network declarations.
//!
//! A [`CidrBlock`] is the unit of address-space accounting in a stack:
//! the network builder subdivides one parent block into equal child blocks,
//! one per subnet, and reports a shape error when the parent cannot cover
//! the request instead of silently truncating it.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Longest prefix a subnet may have. Smaller blocks are not usable as
/// subnets on the target platforms this crate models.
pub const MAX_SUBNET_PREFIX: u8 = 28;

/// A contiguous IPv4 address range in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrBlock {
    network: Ipv4Addr,
    prefix: u8,
}

impl CidrBlock {
    /// Creates a block from an address and prefix length, masking the
    /// address down to its network address.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::invalid_cidr(
                format!("{addr}/{prefix}"),
                "prefix length must be at most 32",
            ));
        }
        let bits = u32::from(addr) & Self::mask(prefix);
        Ok(Self {
            network: Ipv4Addr::from(bits),
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        }
    }

    /// The network address of the block.
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// The prefix length of the block.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses the block covers.
    pub fn address_count(&self) -> u64 {
        1u64 << (32 - self.prefix)
    }

    /// Returns true if `other` lies entirely inside this block.
    pub fn contains(&self, other: &CidrBlock) -> bool {
        other.prefix >= self.prefix
            && (u32::from(other.network) & Self::mask(self.prefix)) == u32::from(self.network)
    }

    /// Splits the block into at least `count` equal child blocks and
    /// returns the first `count` of them.
    ///
    /// Children must not be smaller than a /[`MAX_SUBNET_PREFIX`]; if the
    /// request would force a longer prefix, the whole split fails with
    /// [`Error::AddressSpaceExhausted`].
    pub fn split_into(&self, count: usize) -> Result<Vec<CidrBlock>> {
        if count == 0 {
            return Err(Error::validation("cannot split a CIDR block into 0 subnets"));
        }
        // Round up to the next power of two; equal-size children only.
        let bits = (count as u32).next_power_of_two().trailing_zeros() as u8;
        let child_prefix = self.prefix.saturating_add(bits);
        if child_prefix > MAX_SUBNET_PREFIX {
            return Err(Error::AddressSpaceExhausted {
                cidr: self.to_string(),
                requested: count,
                max_prefix: MAX_SUBNET_PREFIX,
            });
        }
        let step = 1u32 << (32 - child_prefix);
        let base = u32::from(self.network);
        let children = (0..count as u32)
            .map(|i| Self {
                network: Ipv4Addr::from(base + i * step),
                prefix: child_prefix,
            })
            .collect();
        Ok(children)
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for CidrBlock {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr_text, prefix_text) = s
            .split_once('/')
            .ok_or_else(|| Error::invalid_cidr(s, "expected 'a.b.c.d/len'"))?;
        let addr: Ipv4Addr = addr_text
            .parse()
            .map_err(|_| Error::invalid_cidr(s, "invalid IPv4 address"))?;
        let prefix: u8 = prefix_text
            .parse()
            .map_err(|_| Error::invalid_cidr(s, "invalid prefix length"))?;
        Self::new(addr, prefix)
    }
}

impl Serialize for CidrBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CidrBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(|e: Error| D::Error::custom(e.to_string()))
    }
}
