use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub const YES_KEY: &str = "votes:yes";
pub const NO_KEY: &str = "votes:no";
pub const EPOCH_KEY: &str = "votes:epoch";
pub const PURGE_KEY: &str = "votes:purge";
pub const VOTERS_MAP: &str = "votes:voters";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Yes,
    No,
    #[default]
    None,
}

impl Choice {
    pub fn as_str(self) -> &'static str {
        match self {
            Choice::Yes => "yes",
            Choice::No => "no",
            Choice::None => "none",
        }
    }

    /// Counter key a recorded choice lives under.
    pub fn key(self) -> Option<&'static str> {
        match self {
            Choice::Yes => Some(YES_KEY),
            Choice::No => Some(NO_KEY),
            Choice::None => None,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Choice::Yes),
            "no" => Ok(Choice::No),
            "none" => Ok(Choice::None),
            other => Err(format!("unknown choice {other:?}")),
        }
    }
}

/// Snapshot of the shared counters and reset epochs.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
    pub epoch: u64,
    pub purge: u64,
}

impl Tally {
    pub fn total(&self) -> u64 {
        self.yes + self.no
    }

    pub fn bump(&mut self, choice: Choice) {
        match choice {
            Choice::Yes => self.yes += 1,
            Choice::No => self.no += 1,
            Choice::None => {}
        }
    }

    pub fn drop_one(&mut self, choice: Choice) {
        match choice {
            Choice::Yes => self.yes = self.yes.saturating_sub(1),
            Choice::No => self.no = self.no.saturating_sub(1),
            Choice::None => {}
        }
    }

    pub fn zero(&mut self) {
        self.yes = 0;
        self.no = 0;
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VoterRecord {
    pub name: String,
    pub choice: Choice,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CastOutcome {
    Recorded,
    Unchanged,
    Switched { from: Choice },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_round_trip() {
        for choice in [Choice::Yes, Choice::No, Choice::None] {
            assert_eq!(choice.as_str().parse::<Choice>(), Ok(choice));
        }
        assert!("maybe".parse::<Choice>().is_err());
    }

    #[test]
    fn test_choice_serde() {
        assert_eq!(serde_json::to_string(&Choice::Yes).unwrap(), "\"yes\"");
        let parsed: Choice = serde_json::from_str("\"no\"").unwrap();
        assert_eq!(parsed, Choice::No);
    }

    #[test]
    fn test_tally_never_negative() {
        let mut tally = Tally::default();
        tally.drop_one(Choice::Yes);
        tally.bump(Choice::No);
        tally.bump(Choice::None);

        assert_eq!((tally.yes, tally.no, tally.total()), (0, 1, 1));
    }
}
