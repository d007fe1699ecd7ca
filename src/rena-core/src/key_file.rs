//! Section-based `Key=Value` text files.
//!
//! ```text
//! [Song]
//! Title=Karma Police
//! Artist=Radiohead
//!
//! [Lyrics]
//! SavedTime=1700000000000000
//! Provider=lyricsprovider
//! ```
//!
//! Values escape backslash, newline, tab and carriage return (`\\`, `\n`,
//! `\t`, `\r`) and a leading space (`\s`). Groups and keys keep insertion
//! order when written back out.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyFileError {
    #[error("line {line}: key/value pair outside of any group")]
    EntryOutsideGroup { line: usize },
    #[error("line {line}: malformed group header")]
    MalformedGroup { line: usize },
    #[error("line {line}: expected `Key=Value`")]
    MalformedEntry { line: usize },
    #[error("line {line}: invalid escape sequence in value")]
    InvalidEscape { line: usize },
    #[error("group [{group}] not found")]
    MissingGroup { group: String },
    #[error("key {key} not found in group [{group}]")]
    MissingKey { group: String, key: String },
    #[error("key {key} in group [{group}] is not an integer: {value:?}")]
    NotAnInteger {
        group: String,
        key: String,
        value: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFile {
    groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Group {
    name: String,
    entries: Vec<(String, String)>,
}

impl KeyFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Result<Self, KeyFileError> {
        let mut file = KeyFile::new();
        let mut current: Option<usize> = None;

        for (index, raw) in input.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .trim_end()
                    .strip_suffix(']')
                    .filter(|name| !name.is_empty() && !name.contains(['[', ']']))
                    .ok_or(KeyFileError::MalformedGroup { line: line_no })?;
                current = Some(file.group_index_or_insert(name));
                continue;
            }

            let group = current.ok_or(KeyFileError::EntryOutsideGroup { line: line_no })?;
            let (key, value) = line
                .split_once('=')
                .ok_or(KeyFileError::MalformedEntry { line: line_no })?;
            let key = key.trim_end();
            if key.is_empty() {
                return Err(KeyFileError::MalformedEntry { line: line_no });
            }
            // Only ASCII spaces separate `=` from the value; other whitespace is data.
            let value = unescape(value.trim_start_matches(' '))
                .ok_or(KeyFileError::InvalidEscape { line: line_no })?;
            file.groups[group].set(key, value);
        }

        Ok(file)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.group(group).is_some()
    }

    pub fn string(&self, group: &str, key: &str) -> Result<&str, KeyFileError> {
        let found = self.group(group).ok_or_else(|| KeyFileError::MissingGroup {
            group: group.to_string(),
        })?;
        found
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| KeyFileError::MissingKey {
                group: group.to_string(),
                key: key.to_string(),
            })
    }

    pub fn int64(&self, group: &str, key: &str) -> Result<i64, KeyFileError> {
        let value = self.string(group, key)?;
        value
            .trim()
            .parse()
            .map_err(|_| KeyFileError::NotAnInteger {
                group: group.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            })
    }

    pub fn set_string(&mut self, group: &str, key: &str, value: &str) {
        let index = self.group_index_or_insert(group);
        self.groups[index].set(key, value.to_string());
    }

    pub fn set_int64(&mut self, group: &str, key: &str, value: i64) {
        self.set_string(group, key, &value.to_string());
    }

    fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn group_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(index) = self.groups.iter().position(|g| g.name == name) {
            return index;
        }
        self.groups.push(Group {
            name: name.to_string(),
            entries: Vec::new(),
        });
        self.groups.len() - 1
    }
}

impl Group {
    fn set(&mut self, key: &str, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }
}

impl fmt::Display for KeyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, group) in self.groups.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", group.name)?;
            for (key, value) in &group.entries {
                writeln!(f, "{}={}", key, escape(value))?;
            }
        }
        Ok(())
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            ' ' if i == 0 => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            's' => out.push(' '),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_groups_in_insertion_order() {
        let mut file = KeyFile::new();
        file.set_string("Song", "Title", "Karma Police");
        file.set_string("Song", "Artist", "Radiohead");
        file.set_int64("Lyrics", "SavedTime", 42);
        file.set_string("Lyrics", "Provider", "lyricsprovider");

        assert_eq!(
            file.to_string(),
            "[Song]\nTitle=Karma Police\nArtist=Radiohead\n\n\
             [Lyrics]\nSavedTime=42\nProvider=lyricsprovider\n"
        );
    }

    #[test]
    fn parses_what_it_writes() {
        let mut file = KeyFile::new();
        file.set_string("Song", "Title", " leading space, tab\tand\nnewline \\ slash");
        file.set_string("Song", "Empty", "");

        let parsed = KeyFile::parse(&file.to_string()).unwrap();

        assert_eq!(
            parsed.string("Song", "Title").unwrap(),
            " leading space, tab\tand\nnewline \\ slash"
        );
        assert_eq!(parsed.string("Song", "Empty").unwrap(), "");
    }

    #[test]
    fn keeps_leading_non_ascii_whitespace() {
        let mut file = KeyFile::new();
        for (key, value) in [
            ("Ideographic", "\u{3000}Sakura"),
            ("NoBreak", "\u{a0}Band"),
            ("EmSpace", "\u{2003}prov"),
            ("Vertical", "\u{b}tab"),
            ("FormFeed", "\u{c}feed"),
        ] {
            file.set_string("Song", key, value);
        }

        let parsed = KeyFile::parse(&file.to_string()).unwrap();

        assert_eq!(parsed.string("Song", "Ideographic").unwrap(), "\u{3000}Sakura");
        assert_eq!(parsed.string("Song", "NoBreak").unwrap(), "\u{a0}Band");
        assert_eq!(parsed.string("Song", "EmSpace").unwrap(), "\u{2003}prov");
        assert_eq!(parsed.string("Song", "Vertical").unwrap(), "\u{b}tab");
        assert_eq!(parsed.string("Song", "FormFeed").unwrap(), "\u{c}feed");
    }

    #[test]
    fn tolerates_comments_whitespace_and_crlf() {
        let input = "# cache entry\r\n[Song]\r\n  Title = Airbag\r\n\r\nArtist=Radiohead\r\n";
        let parsed = KeyFile::parse(input).unwrap();
        assert_eq!(parsed.string("Song", "Title").unwrap(), "Airbag");
        assert_eq!(parsed.string("Song", "Artist").unwrap(), "Radiohead");
    }

    #[test]
    fn later_keys_replace_earlier_ones() {
        let parsed = KeyFile::parse("[A]\nk=1\n[B]\nx=y\n[A]\nk=2\n").unwrap();
        assert_eq!(parsed.int64("A", "k").unwrap(), 2);
        assert!(parsed.has_group("B"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            KeyFile::parse("Title=x\n"),
            Err(KeyFileError::EntryOutsideGroup { line: 1 })
        );
        assert_eq!(
            KeyFile::parse("[Song\n"),
            Err(KeyFileError::MalformedGroup { line: 1 })
        );
        assert_eq!(
            KeyFile::parse("[Song]\njust text\n"),
            Err(KeyFileError::MalformedEntry { line: 2 })
        );
        assert_eq!(
            KeyFile::parse("[Song]\nTitle=bad \\q escape\n"),
            Err(KeyFileError::InvalidEscape { line: 2 })
        );
    }

    #[test]
    fn typed_lookups_report_what_is_missing() {
        let parsed = KeyFile::parse("[Song]\nCount=many\n").unwrap();
        assert!(matches!(
            parsed.string("Lyrics", "Provider"),
            Err(KeyFileError::MissingGroup { .. })
        ));
        assert!(matches!(
            parsed.string("Song", "Provider"),
            Err(KeyFileError::MissingKey { .. })
        ));
        assert!(matches!(
            parsed.int64("Song", "Count"),
            Err(KeyFileError::NotAnInteger { .. })
        ));
    }
}
