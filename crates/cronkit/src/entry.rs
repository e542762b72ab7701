//! A single scheduled job.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// `@name` shorthand schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialTime {
    Reboot,
    Yearly,
    Annually,
    Monthly,
    Weekly,
    Daily,
    Midnight,
    Hourly,
}

impl SpecialTime {
    pub const ALL: [Self; 8] = [
        Self::Reboot,
        Self::Yearly,
        Self::Annually,
        Self::Monthly,
        Self::Weekly,
        Self::Daily,
        Self::Midnight,
        Self::Hourly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Yearly => "yearly",
            Self::Annually => "annually",
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
            Self::Midnight => "midnight",
            Self::Hourly => "hourly",
        }
    }
}

impl fmt::Display for SpecialTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.as_str())
    }
}

impl FromStr for SpecialTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.strip_prefix('@').unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| Error::UnknownSpecialTime(s.to_string()))
    }
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
const WEEKDAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Environment keys with dedicated properties.
pub const DEDICATED_KEYS: [&str; 4] = ["MAILTO", "PATH", "SHELL", "HOME"];

/// A cron job: schedule, command and the environment it runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CronEntry {
    pub minute: String,
    pub hour: String,
    pub day: String,
    pub month: String,
    pub weekday: String,
    /// Replaces the five fields when set
    pub time: Option<SpecialTime>,
    pub command: Option<String>,
    pub mailto: Option<String>,
    pub path: Option<String>,
    pub shell: Option<String>,
    pub home: Option<String>,
    pub environment: BTreeMap<String, String>,
}

impl Default for CronEntry {
    fn default() -> Self {
        Self {
            minute: "*".into(),
            hour: "*".into(),
            day: "*".into(),
            month: "*".into(),
            weekday: "*".into(),
            time: None,
            command: None,
            mailto: None,
            path: None,
            shell: None,
            home: None,
            environment: BTreeMap::new(),
        }
    }
}

impl CronEntry {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Value of a dedicated property by its environment key.
    pub fn dedicated(&self, key: &str) -> Option<&String> {
        match key {
            "MAILTO" => self.mailto.as_ref(),
            "PATH" => self.path.as_ref(),
            "SHELL" => self.shell.as_ref(),
            "HOME" => self.home.as_ref(),
            _ => None,
        }
    }

    /// Set a variable, routing dedicated keys to their property.
    pub fn set_variable(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match key {
            "MAILTO" => self.mailto = Some(value),
            "PATH" => self.path = Some(value),
            "SHELL" => self.shell = Some(value),
            "HOME" => self.home = Some(value),
            _ => {
                self.environment.insert(key.to_string(), value);
            }
        }
    }

    /// Check schedule fields and that there is a command to run.
    pub fn validate(&self) -> Result<()> {
        if self.command.as_deref().is_none_or(|c| c.trim().is_empty()) {
            return Err(Error::MissingCommand);
        }
        if self.time.is_some() {
            return Ok(());
        }
        validate_numeric("minute", &self.minute, 0, 59, &[])?;
        validate_numeric("hour", &self.hour, 0, 23, &[])?;
        validate_numeric("day", &self.day, 1, 31, &[])?;
        validate_numeric("month", &self.month, 1, 12, &MONTHS)?;
        validate_weekday(&self.weekday)
    }

    /// Fail when an environment entry contradicts a dedicated property.
    pub fn check_conflicts(&self) -> Result<()> {
        for key in DEDICATED_KEYS {
            if let (Some(property), Some(environment)) = (self.dedicated(key), self.environment.get(key))
                && property != environment
            {
                return Err(Error::Conflict {
                    key,
                    property: property.clone(),
                    environment: environment.clone(),
                });
            }
        }
        Ok(())
    }

    /// Move dedicated keys out of `environment` into their properties.
    ///
    /// A crontab cannot tell `MAILTO` given as a property from `MAILTO`
    /// given in the environment, so comparisons use this form.
    pub fn normalized(&self) -> Self {
        let mut entry = self.clone();
        for key in DEDICATED_KEYS {
            if let Some(value) = entry.environment.remove(key)
                && entry.dedicated(key).is_none()
            {
                entry.set_variable(key, value);
            }
        }
        entry
    }

    /// Whether `other` schedules anything differently from `self`.
    pub fn differs_from(&self, other: &Self) -> bool {
        let (a, b) = (self.normalized(), other.normalized());
        a.minute != b.minute
            || a.hour != b.hour
            || a.day != b.day
            || a.month != b.month
            || a.weekday != b.weekday
            || a.time != b.time
            || a.command != b.command
            || a.mailto != b.mailto
            || a.path != b.path
            || a.shell != b.shell
            || a.home != b.home
            || a.environment != b.environment
    }

    /// The schedule line, or `None` without a command.
    pub fn schedule_line(&self) -> Option<String> {
        let command = self.command.as_deref()?;
        Some(match self.time {
            Some(time) => format!("{time} {command}"),
            None => format!(
                "{} {} {} {} {} {command}",
                self.minute, self.hour, self.day, self.month, self.weekday
            ),
        })
    }
}

/// Check a field: a comma list of `*`, a value or `a-b`, each with an optional `/step`.
fn validate_numeric(
    field: &'static str,
    value: &str,
    min: u32,
    max: u32,
    names: &[&str],
) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(field, value, "must not be empty"));
    }
    if value.contains(char::is_whitespace) {
        return Err(invalid(field, value, "must not contain whitespace"));
    }
    for item in value.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };
        if let Some(step) = step
            && !step.parse::<u32>().is_ok_and(|n| n >= 1)
        {
            return Err(invalid(field, value, &format!("step '{step}' is not a positive number")));
        }
        if range == "*" {
            continue;
        }
        match range.split_once('-') {
            Some((start, end)) => {
                check_value(field, value, start, min, max, names)?;
                check_value(field, value, end, min, max, names)?;
            }
            None => check_value(field, value, range, min, max, names)?,
        }
    }
    Ok(())
}

/// One bound of a range: a number within `min..=max` or an allowed name.
fn check_value(
    field: &'static str,
    value: &str,
    part: &str,
    min: u32,
    max: u32,
    names: &[&str],
) -> Result<()> {
    if names.contains(&part.to_ascii_lowercase().as_str()) {
        return Ok(());
    }
    match part.parse::<u32>() {
        Ok(n) if (min..=max).contains(&n) => Ok(()),
        Ok(_) => Err(invalid(field, value, &format!("must be between {min} and {max}"))),
        Err(_) => Err(invalid(field, value, "is not a number or cron expression")),
    }
}

fn validate_weekday(value: &str) -> Result<()> {
    if WEEKDAY_NAMES.contains(&value.to_ascii_lowercase().as_str()) {
        return Ok(());
    }
    validate_numeric("weekday", value, 0, 7, &WEEKDAYS)
}

fn invalid(field: &'static str, value: &str, reason: &str) -> Error {
    Error::InvalidField {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_wildcards() {
        let entry = CronEntry::default();
        assert_eq!(entry.minute, "*");
        assert_eq!(entry.weekday, "*");
        assert_eq!(entry.time, None);
        assert_eq!(entry.command, None);
    }

    #[test]
    fn test_validate_ranges() {
        let mut entry = CronEntry::new("/bin/true");
        assert!(entry.validate().is_ok());

        entry.minute = "60".into();
        assert!(matches!(
            entry.validate(),
            Err(Error::InvalidField { field: "minute", .. })
        ));

        entry.minute = "*/5".into();
        entry.hour = "24".into();
        assert!(entry.validate().is_err());

        entry.hour = "1-5".into();
        entry.day = "0".into();
        assert!(entry.validate().is_err());

        entry.day = "31".into();
        entry.month = "Jan".into();
        entry.weekday = "Mon".into();
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_validate_weekday() {
        let mut entry = CronEntry::new("/bin/true");
        for ok in ["0", "7", "sunday", "Sat", "1-5"] {
            entry.weekday = ok.into();
            assert!(entry.validate().is_ok(), "{ok} should be valid");
        }
        for bad in ["8", "funday", "x", "-1", "mon-"] {
            entry.weekday = bad.into();
            assert!(entry.validate().is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn test_validate_expressions() {
        let mut entry = CronEntry::new("/bin/true");
        for ok in ["*/15", "1-5", "1,3,5", "0-30/10", "5,10-20,*/7"] {
            entry.minute = ok.into();
            assert!(entry.validate().is_ok(), "{ok} should be valid");
        }
        for bad in ["99-100", "*/x", "*/0", "1-2 3", " 5", "1,,2", "-", "1-60"] {
            entry.minute = bad.into();
            assert!(entry.validate().is_err(), "{bad} should be invalid");
        }

        entry.minute = "1-2 3".into();
        assert!(matches!(
            entry.validate(),
            Err(Error::InvalidField { field: "minute", reason, .. }) if reason.contains("whitespace")
        ));

        entry.minute = "0".into();
        entry.month = "jan-mar,dec".into();
        entry.weekday = "mon-fri".into();
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_special_time_skips_field_checks() {
        let mut entry = CronEntry::new("/bin/true");
        entry.minute = "99".into();
        entry.time = Some(SpecialTime::Reboot);
        assert!(entry.validate().is_ok());
        assert_eq!(entry.schedule_line().unwrap(), "@reboot /bin/true");
    }

    #[test]
    fn test_missing_command() {
        assert_eq!(CronEntry::default().validate(), Err(Error::MissingCommand));
    }

    #[test]
    fn test_conflicting_mailto() {
        let mut entry = CronEntry::new("/bin/true");
        entry.mailto = Some("a@example.com".into());
        entry.environment.insert("MAILTO".into(), "b@example.com".into());
        let err = entry.check_conflicts().unwrap_err();
        assert!(matches!(err, Error::Conflict { key: "MAILTO", .. }));

        entry.environment.insert("MAILTO".into(), "a@example.com".into());
        assert!(entry.check_conflicts().is_ok());
    }

    #[test]
    fn test_differs_from() {
        let base = CronEntry::new("/bin/true");
        let mut other = base.clone();
        assert!(!base.differs_from(&other));

        other.minute = "0".into();
        assert!(base.differs_from(&other));

        let mut other = base.clone();
        other.environment.insert("TEST".into(), "1".into());
        assert!(base.differs_from(&other));

        let mut other = base.clone();
        other.time = Some(SpecialTime::Daily);
        assert!(base.differs_from(&other));
    }

    #[test]
    fn test_environment_mailto_equals_property() {
        let mut declared = CronEntry::new("/bin/true");
        declared.environment.insert("MAILTO".into(), "ops@example.com".into());

        let mut parsed = CronEntry::new("/bin/true");
        parsed.mailto = Some("ops@example.com".into());
        assert!(!declared.differs_from(&parsed));
    }

    #[test]
    fn test_special_time_parse() {
        assert_eq!("@daily".parse::<SpecialTime>().unwrap(), SpecialTime::Daily);
        assert_eq!("hourly".parse::<SpecialTime>().unwrap(), SpecialTime::Hourly);
        assert!("@sometimes".parse::<SpecialTime>().is_err());
    }

    #[test]
    fn test_deserialize() {
        let entry: CronEntry = toml::from_str(
            r#"
            minute = "0"
            command = "/usr/bin/backup"
            time = "weekly"
            [environment]
            TZ = "UTC"
            "#,
        )
        .unwrap();
        assert_eq!(entry.minute, "0");
        assert_eq!(entry.hour, "*");
        assert_eq!(entry.time, Some(SpecialTime::Weekly));
        assert_eq!(entry.environment["TZ"], "UTC");
    }
}
