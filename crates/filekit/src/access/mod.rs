//! Access-control reconciliation.
//!
//! Two flavours share the [`AccessReconciler`] interface:
//!
//! - [`PosixAccess`]: owner, group and permission bits
//! - [`AclAccess`]: explicit allow/deny entries plus an inheritance flag,
//!   read and written through an [`AclBackend`]
//!
//! Both compare first and only touch what differs, so applying the same
//! specification twice reports no changes the second time.

pub mod acl;
pub mod posix;
pub mod principal;

pub use acl::{AclAccess, AclBackend, AclEntry, AclSpec, MemoryAcl};
pub use posix::PosixAccess;
pub use principal::{resolve_gid, resolve_uid};

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Interface shared by every access-control flavour.
pub trait AccessReconciler {
    /// Whether any change is required.
    fn compare(&self) -> bool;

    /// Human-readable descriptions of the pending changes.
    fn describe_changes(&self) -> Vec<String>;

    /// Apply pending changes. A no-op when [`compare`](Self::compare) is false.
    fn apply(&mut self) -> Result<()>;
}

/// A user or group, by name or numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    Id(u32),
    Name(String),
}

impl Principal {
    /// Parse a principal, treating all-digit strings as ids.
    pub fn parse(value: &str) -> Self {
        value
            .parse::<u32>()
            .map_or_else(|_| Self::Name(value.to_string()), Self::Id)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Permission bits, masked to the low 12 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(u32);

impl Mode {
    pub const fn new(bits: u32) -> Self {
        Self(bits & 0o7777)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn has_setuid(self) -> bool {
        self.0 & 0o4000 != 0
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches("0o");
        if digits.is_empty() || digits.len() > 5 {
            return Err(Error::InvalidMode(s.to_string()));
        }
        let bits = u32::from_str_radix(digits, 8).map_err(|_| Error::InvalidMode(s.to_string()))?;
        if bits > 0o7777 {
            return Err(Error::InvalidMode(s.to_string()));
        }
        Ok(Self(bits))
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bits(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bits(bits) if bits <= 0o7777 => Ok(Self(bits)),
            Raw::Bits(bits) => Err(serde::de::Error::custom(format!("mode {bits:o} out of range"))),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Desired owner, group and mode. Unset facets are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSpec {
    pub owner: Option<Principal>,
    pub group: Option<Principal>,
    pub mode: Option<Mode>,
}

impl AccessSpec {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.mode.is_none()
    }
}
