//! # Filekit
//!
//! Building blocks for converging files:
//!
//! - [`checksum`]: content checksums used to decide whether to rewrite
//! - [`diff`]: unified diffs with size, binary and length suppression
//! - [`backup`]: timestamped backups with count-based retention
//! - [`access`]: owner/group/mode and ACL reconciliation
//! - [`deploy`]: atomic content replacement and timestamp updates
//!
//! Each piece is independent and configured explicitly; nothing reads
//! global state.

pub mod access;
pub mod backup;
pub mod checksum;
pub mod deploy;
pub mod diff;
pub mod error;

pub use access::{
    AccessReconciler, AccessSpec, AclAccess, AclBackend, AclEntry, AclSpec, MemoryAcl, Mode,
    PosixAccess, Principal,
};
pub use backup::{BackupManager, BackupOptions};
pub use checksum::{checksum_bytes, checksum_file, short_checksum};
pub use diff::{Candidate, ContentDiff, DiffEngine, DiffOptions};
pub use error::{Error, Result};
