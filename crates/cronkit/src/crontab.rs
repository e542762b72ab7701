//! Crontab text with named, marker-delimited sections.
//!
//! A managed entry is a run of lines starting at a marker comment:
//!
//! ```text
//! # Converge Name: nightly backup
//! MAILTO="ops@example.com"
//! TZ=UTC
//! 0 3 * * * /usr/local/bin/backup
//! ```
//!
//! The section is the marker, the variable lines right after it and at most
//! one schedule line. Anything else (a comment, a blank line, another
//! marker) ends the section early. Lines outside managed sections are kept
//! exactly as they were.

use crate::entry::{CronEntry, DEDICATED_KEYS, SpecialTime};

/// Marker comment for the entry `name` managed by `tool`.
pub fn marker_line(tool: &str, name: &str) -> String {
    format!("# {tool} Name: {name}")
}

/// Line range `[start, end)` of a section, marker included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub start: usize,
    pub end: usize,
}

/// What one crontab line is.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line<'a> {
    Variable(&'a str, String),
    Special(SpecialTime, &'a str),
    Schedule([&'a str; 5], &'a str),
    Other,
}

fn classify(line: &str) -> Line<'_> {
    if let Some((key, value)) = parse_variable(line) {
        return Line::Variable(key, value);
    }
    if let Some(rest) = line.strip_prefix('@') {
        let (name, command) = split_first(rest);
        if let Ok(time) = name.parse::<SpecialTime>()
            && !command.is_empty()
        {
            return Line::Special(time, command);
        }
        return Line::Other;
    }
    parse_schedule(line).map_or(Line::Other, |(fields, command)| Line::Schedule(fields, command))
}

/// `KEY=VALUE`, with one layer of matching quotes removed from the value.
fn parse_variable(line: &str) -> Option<(&str, String)> {
    if line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, unquote(value.trim())))
}

/// Strip matching quotes; inside double quotes `\\` and `\"` are unescaped.
fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let mut out = String::with_capacity(value.len());
        let mut chars = value[1..value.len() - 1].chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(next @ ('\\' | '"')) => out.push(next),
                    Some(next) => {
                        out.push(c);
                        out.push(next);
                    }
                    None => out.push(c),
                },
                _ => out.push(c),
            }
        }
        return out;
    }
    value.to_string()
}

/// Split off the first whitespace-delimited token; the rest keeps its spacing.
fn split_first(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn is_field(token: &str, allow_names: bool) -> bool {
    let numeric = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '*' | ',' | '-' | '/'));
    let named = allow_names && token.len() == 3 && token.chars().all(|c| c.is_ascii_alphabetic());
    numeric || named
}

fn parse_schedule(line: &str) -> Option<([&str; 5], &str)> {
    let mut fields = [""; 5];
    let mut rest = line;
    for (i, slot) in fields.iter_mut().enumerate() {
        let (token, tail) = split_first(rest);
        if !is_field(token, i >= 3) {
            return None;
        }
        *slot = token;
        rest = tail;
    }
    let command = rest.trim_end();
    (!command.is_empty()).then_some((fields, command))
}

fn quote_if_needed(value: &str) -> String {
    let special = |c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$' | '#' | '`' | ';');
    if value.contains(special) {
        double_quote(value)
    } else {
        value.to_string()
    }
}

fn double_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Lines of a section for `entry` under `marker`.
pub fn render_section(marker: &str, entry: &CronEntry) -> Vec<String> {
    let mut lines = vec![marker.to_string()];
    for key in DEDICATED_KEYS {
        if let Some(value) = entry.dedicated(key) {
            lines.push(format!("{key}={}", double_quote(value)));
        }
    }
    for (key, value) in &entry.environment {
        if DEDICATED_KEYS.contains(&key.as_str()) && entry.dedicated(key).is_some() {
            continue;
        }
        lines.push(format!("{key}={}", quote_if_needed(value)));
    }
    if let Some(schedule) = entry.schedule_line() {
        lines.push(schedule);
    }
    lines
}

/// A parsed crontab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crontab {
    lines: Vec<String>,
}

impl Crontab {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// All sections starting with `marker`, in order.
    pub fn sections(&self, marker: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut i = 0;
        while i < self.lines.len() {
            if self.lines[i] == marker {
                let section = self.bounds(i);
                i = section.end;
                sections.push(section);
            } else {
                i += 1;
            }
        }
        sections
    }

    /// First section starting with `marker`.
    pub fn find(&self, marker: &str) -> Option<Section> {
        self.sections(marker).into_iter().next()
    }

    fn bounds(&self, start: usize) -> Section {
        let mut end = start + 1;
        while let Some(line) = self.lines.get(end) {
            match classify(line) {
                Line::Variable(..) => end += 1,
                Line::Special(..) | Line::Schedule(..) => {
                    end += 1;
                    break;
                }
                Line::Other => break,
            }
        }
        Section { start, end }
    }

    /// Rebuild the entry stored in `section`.
    ///
    /// A section without a schedule line yields wildcard fields and no
    /// command.
    pub fn entry(&self, section: Section) -> CronEntry {
        let mut entry = CronEntry::default();
        for line in &self.lines[section.start + 1..section.end] {
            match classify(line) {
                Line::Variable(key, value) => entry.set_variable(key, value),
                Line::Special(time, command) => {
                    entry.time = Some(time);
                    entry.command = Some(command.to_string());
                }
                Line::Schedule([minute, hour, day, month, weekday], command) => {
                    entry.minute = minute.to_string();
                    entry.hour = hour.to_string();
                    entry.day = day.to_string();
                    entry.month = month.to_string();
                    entry.weekday = weekday.to_string();
                    entry.command = Some(command.to_string());
                }
                Line::Other => {}
            }
        }
        entry
    }

    /// Entry stored under `marker`, if any.
    pub fn get(&self, marker: &str) -> Option<CronEntry> {
        self.find(marker).map(|s| self.entry(s))
    }

    /// Write `entry` under `marker`.
    ///
    /// An existing section is replaced in place and any duplicates of it are
    /// dropped; otherwise the section is appended. Returns whether a section
    /// already existed.
    pub fn upsert(&mut self, marker: &str, entry: &CronEntry) -> bool {
        let sections = self.sections(marker);
        let rendered = render_section(marker, entry);
        let Some((first, duplicates)) = sections.split_first() else {
            self.lines.extend(rendered);
            return false;
        };
        for dup in duplicates.iter().rev() {
            self.lines.drain(dup.start..dup.end);
        }
        self.lines.splice(first.start..first.end, rendered);
        true
    }

    /// Remove every section under `marker`. Returns whether any existed.
    pub fn remove(&mut self, marker: &str) -> bool {
        let sections = self.sections(marker);
        for section in sections.iter().rev() {
            self.lines.drain(section.start..section.end);
        }
        !sections.is_empty()
    }

    /// Crontab text, newline-terminated unless empty.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}
