//! # Cronkit
//!
//! Crontab editing that only touches the entries it owns.
//!
//! Each managed job lives in a section introduced by a marker comment
//! (`# <Tool> Name: <name>`). [`Crontab`] finds those sections, turns them
//! into [`CronEntry`] values, and rewrites or removes them while leaving
//! every other line alone.
//!
//! ```ignore
//! use cronkit::{marker_line, CronEntry, Crontab};
//!
//! let mut tab = Crontab::parse(&existing);
//! let marker = marker_line("Converge", "nightly backup");
//! let mut entry = CronEntry::new("/usr/local/bin/backup");
//! entry.minute = "0".into();
//! entry.hour = "3".into();
//! entry.validate()?;
//!
//! if tab.get(&marker).is_none_or(|current| current.differs_from(&entry)) {
//!     tab.upsert(&marker, &entry);
//!     write_back(tab.render());
//! }
//! ```

pub mod crontab;
pub mod entry;
pub mod error;

pub use crontab::{marker_line, render_section, Crontab, Section};
pub use entry::{CronEntry, SpecialTime, DEDICATED_KEYS};
pub use error::{Error, Result};
