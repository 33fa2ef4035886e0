//! Rules of a single cooperate/defect match.

use std::fmt::{self, Display};

/// A player's choice for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Split,
    Steal,
}

impl Choice {
    /// Interpret a round reply. Anything that is not an exact `STEAL` —
    /// including a dropped connection (`None`) or garbage input — counts
    /// as `SPLIT`.
    pub fn from_reply(reply: Option<&str>) -> Self {
        match reply {
            Some("STEAL") => Choice::Steal,
            _ => Choice::Split,
        }
    }

    /// Points gained by a player choosing `self` against an opponent
    /// choosing `other`.
    pub fn payoff(self, other: Choice) -> u32 {
        match (self, other) {
            (Choice::Split, Choice::Split) => 3,
            (Choice::Split, Choice::Steal) => 0,
            (Choice::Steal, Choice::Split) => 5,
            (Choice::Steal, Choice::Steal) => 1,
        }
    }
}

impl Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Split => write!(f, "SPLIT"),
            Choice::Steal => write!(f, "STEAL"),
        }
    }
}

/// Outcome of a finished match from one player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Win,
    Lose,
    Draw,
}

impl Verdict {
    /// Compare cumulative scores. Equality is a draw.
    pub fn of(own: u32, opponent: u32) -> Self {
        match own.cmp(&opponent) {
            std::cmp::Ordering::Greater => Verdict::Win,
            std::cmp::Ordering::Less => Verdict::Lose,
            std::cmp::Ordering::Equal => Verdict::Draw,
        }
    }

    /// The same outcome seen from the opponent's side.
    pub fn reversed(self) -> Self {
        match self {
            Verdict::Win => Verdict::Lose,
            Verdict::Lose => Verdict::Win,
            Verdict::Draw => Verdict::Draw,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Verdict::Win => "You win the match!\n",
            Verdict::Lose => "You lose the match!\n",
            Verdict::Draw => "The match is a draw!\n",
        }
    }
}
