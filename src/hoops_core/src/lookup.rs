use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Result, SimError};

/// One team's naming and conference details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamEntry {
    /// Display name, e.g. "Purdue"
    pub name: String,
    /// Short identifier used in stat feeds and matchups, e.g. "purdue"
    pub nickname: String,
    pub conference: String,
}

/// Name, nickname and conference lookups.
///
/// Built once at startup and passed to whatever needs name resolution.
/// Lookups are case-insensitive on both names and nicknames.
#[derive(Clone, Debug, Default)]
pub struct TeamDirectory {
    entries: Vec<TeamEntry>,
    by_name: HashMap<String, usize>,
    by_nickname: HashMap<String, usize>,
}

impl TeamDirectory {
    pub fn new(entries: impl IntoIterator<Item = TeamEntry>) -> Result<Self> {
        let mut directory = TeamDirectory::default();
        for entry in entries {
            let idx = directory.entries.len();
            if directory
                .by_nickname
                .insert(entry.nickname.to_lowercase(), idx)
                .is_some()
            {
                return Err(SimError::InvalidConfig(format!(
                    "duplicate team nickname: {}",
                    entry.nickname
                )));
            }
            directory.by_name.insert(entry.name.to_lowercase(), idx);
            directory.entries.push(entry);
        }
        Ok(directory)
    }

    /// Read a directory file.
    /// Format: name,nickname,conference
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() != 3 {
                return Err(SimError::InvalidConfig(format!(
                    "line {}: expected name,nickname,conference",
                    line_no + 1
                )));
            }
            entries.push(TeamEntry {
                name: parts[0].to_string(),
                nickname: parts[1].to_string(),
                conference: parts[2].to_string(),
            });
        }

        TeamDirectory::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TeamEntry] {
        &self.entries
    }

    /// Find a team by display name or nickname.
    pub fn resolve(&self, team: &str) -> Option<&TeamEntry> {
        let key = team.trim().to_lowercase();
        self.by_nickname
            .get(&key)
            .or_else(|| self.by_name.get(&key))
            .map(|&idx| &self.entries[idx])
    }

    pub fn nickname_for(&self, name: &str) -> Result<&str> {
        self.resolve(name)
            .map(|e| e.nickname.as_str())
            .ok_or_else(|| SimError::UnknownTeam(name.to_string()))
    }

    pub fn name_for(&self, nickname: &str) -> Result<&str> {
        self.resolve(nickname)
            .map(|e| e.name.as_str())
            .ok_or_else(|| SimError::UnknownTeam(nickname.to_string()))
    }

    pub fn conference_of(&self, team: &str) -> Option<&str> {
        self.resolve(team).map(|e| e.conference.as_str())
    }

    /// Nicknames of every team in a conference, in directory order.
    pub fn conference_members(&self, conference: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.conference.eq_ignore_ascii_case(conference))
            .map(|e| e.nickname.as_str())
            .collect()
    }
}
