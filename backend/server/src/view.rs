use serde::{Deserialize, Serialize};

use crate::{
    models::{Choice, Tally, VoterRecord},
    session::{Phase, SessionGate},
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Counts {
    pub yes: u64,
    pub no: u64,
    pub total: u64,
    pub yes_pct: f64,
    pub no_pct: f64,
}

impl From<&Tally> for Counts {
    fn from(tally: &Tally) -> Self {
        let total = tally.total();
        let pct = |count: u64| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            }
        };

        Self {
            yes: tally.yes,
            no: tally.no,
            total,
            yes_pct: pct(tally.yes),
            no_pct: pct(tally.no),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionView {
    pub voted: bool,
    pub choice: Choice,
    pub name: Option<String>,
    pub phase: Phase,
    pub can_vote: bool,
}

impl From<&SessionGate> for SessionView {
    fn from(gate: &SessionGate) -> Self {
        Self {
            voted: gate.voted(),
            choice: gate.choice(),
            name: gate.display_name().map(str::to_string),
            phase: gate.phase(),
            can_vote: gate.can_vote(),
        }
    }
}

/// Everything a front end needs to draw the widget.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct View {
    pub counts: Counts,
    pub session: SessionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters: Option<Vec<VoterRecord>>,
    pub headline: String,
    pub message: String,
    pub warning: Option<String>,
    pub refresh_ms: u64,
}

impl View {
    pub fn new(
        tally: &Tally,
        gate: &SessionGate,
        voters: Option<Vec<VoterRecord>>,
        warning: Option<String>,
        refresh_ms: u64,
    ) -> Self {
        let counts = Counts::from(tally);

        let headline = match counts.total {
            0 => "No votes yet".to_string(),
            total => format!("Total votes: {total}"),
        };

        let message = match (gate.voted(), gate.choice()) {
            (true, Choice::None) => "You already voted, thanks for participating!".to_string(),
            (true, choice) => format!("You already voted {choice}, thanks for participating!"),
            (false, _) => {
                "You can vote only once. After voting the buttons will be disabled for you."
                    .to_string()
            }
        };

        Self {
            counts,
            session: SessionView::from(gate),
            voters,
            headline,
            message,
            warning,
            refresh_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tally() {
        let view = View::new(
            &Tally::default(),
            &SessionGate::default(),
            None,
            None,
            2000,
        );

        assert_eq!(view.headline, "No votes yet");
        assert_eq!(view.counts.yes_pct, 0.0);
        assert!(view.session.can_vote);
        assert!(view.message.starts_with("You can vote only once"));
    }

    #[test]
    fn test_percentages() {
        let tally = Tally {
            yes: 3,
            no: 1,
            ..Tally::default()
        };
        let counts = Counts::from(&tally);

        assert_eq!(counts.total, 4);
        assert_eq!(counts.yes_pct, 75.0);
        assert_eq!(counts.no_pct, 25.0);
    }

    #[test]
    fn test_voted_message() {
        let mut gate = SessionGate::default();
        gate.record_vote(Choice::No);

        let view = View::new(&Tally::default(), &gate, None, None, 2000);

        assert_eq!(view.message, "You already voted no, thanks for participating!");
        assert!(!view.session.can_vote);
        assert_eq!(view.session.phase, Phase::Voted);
    }
}
