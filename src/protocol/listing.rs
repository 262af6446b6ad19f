//! Module `listing`
//!
//! Parses Unix `ls -l`-style directory listing lines as produced by a LIST
//! data transfer: permission string, link count (ignored), owner, group,
//! size, month name, day, year-or-HH:MM, and name.

use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use log::debug;

/// Entry kind, taken from the first character of the permission string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One rwx triad of the permission string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionTriad {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

/// Per-owner/group/other permission flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub owner: PermissionTriad,
    pub group: PermissionTriad,
    pub other: PermissionTriad,
}

/// A parsed directory entry.
///
/// `modified_time` is present only when the listing carried an HH:MM field,
/// which by the listing convention implies the current year; a bare year
/// carries no time-of-day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub kind: EntryKind,
    pub permissions: Permissions,
    pub owner: String,
    pub group: String,
    pub size: u64,
    pub modified_date: NaiveDate,
    pub modified_time: Option<NaiveTime>,
    pub name: String,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

/// Parses one whitespace-delimited `ls -l` line.
///
/// Lines with fewer than 9 tokens or unparseable fields are skipped by
/// returning `None`; a single odd line must not abort a whole listing.
pub fn parse_list_line(line: &str) -> Option<FileEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 9 {
        return None;
    }

    let mode = tokens[0];
    let mut chars = mode.chars();
    let kind = match chars.next()? {
        '-' => EntryKind::File,
        'd' => EntryKind::Directory,
        'l' => EntryKind::Symlink,
        other => {
            debug!("Unrecognized entry type {:?} in listing line", other);
            return None;
        }
    };

    let flags: Vec<char> = chars.collect();
    if flags.len() < 9 {
        return None;
    }
    let permissions = Permissions {
        owner: parse_triad(&flags[0..3]),
        group: parse_triad(&flags[3..6]),
        other: parse_triad(&flags[6..9]),
    };

    // tokens[1] is the link count, which nothing downstream needs.
    let owner = tokens[2].to_string();
    let group = tokens[3].to_string();
    let size: u64 = tokens[4].parse().ok()?;

    let month = parse_month(tokens[5])?;
    let day: u32 = tokens[6].parse().ok()?;

    // A colon means the field is HH:MM, implying the current year;
    // otherwise it is a bare year with no time-of-day.
    let (year, modified_time) = if tokens[7].contains(':') {
        let (hour, minute) = tokens[7].split_once(':')?;
        let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
        (Utc::now().year(), Some(time))
    } else {
        (tokens[7].parse().ok()?, None)
    };
    let modified_date = NaiveDate::from_ymd_opt(year, month, day)?;

    let name = tokens[8..].join(" ");

    Some(FileEntry {
        kind,
        permissions,
        owner,
        group,
        size,
        modified_date,
        modified_time,
        name,
    })
}

fn parse_triad(flags: &[char]) -> PermissionTriad {
    PermissionTriad {
        read: flags[0] == 'r',
        write: flags[1] == 'w',
        exec: flags[2] != '-',
    }
}

fn parse_month(token: &str) -> Option<u32> {
    match token.to_ascii_lowercase().as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}
