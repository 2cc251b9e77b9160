//! Listener votes and what each one means for training.

use serde::Serialize;
use std::fmt;

/// One of the five answers a listener can give about a track.
///
/// The numeric codes are the tokens typed at the prompt:
///
/// | code | vote          | trains? | label | weight |
/// |------|---------------|---------|-------|--------|
/// | 0    | strong dislike| yes     | 0     | 1.0    |
/// | 1    | strong like   | yes     | 1     | 1.0    |
/// | 2    | indifferent   | no      | -     | -      |
/// | 3    | weak like     | yes     | 1     | 0.5    |
/// | 4    | weak dislike  | yes     | 0     | 0.5    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Vote {
    StrongDislike,
    StrongLike,
    Indifferent,
    WeakLike,
    WeakDislike,
}

/// Training meaning of a vote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteSignal {
    pub label: u8,
    pub weight: f64,
}

impl Vote {
    pub const ALL: [Vote; 5] = [
        Vote::StrongDislike,
        Vote::StrongLike,
        Vote::Indifferent,
        Vote::WeakLike,
        Vote::WeakDislike,
    ];

    /// Parse a prompt token. Surrounding whitespace is ignored.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "0" => Some(Vote::StrongDislike),
            "1" => Some(Vote::StrongLike),
            "2" => Some(Vote::Indifferent),
            "3" => Some(Vote::WeakLike),
            "4" => Some(Vote::WeakDislike),
            _ => None,
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Vote::StrongDislike => 0,
            Vote::StrongLike => 1,
            Vote::Indifferent => 2,
            Vote::WeakLike => 3,
            Vote::WeakDislike => 4,
        }
    }

    /// The single place where votes turn into labels and weights.
    /// `None` means the vote is logged but never trained on.
    #[must_use]
    pub const fn signal(self) -> Option<VoteSignal> {
        match self {
            Vote::StrongDislike => Some(VoteSignal { label: 0, weight: 1.0 }),
            Vote::StrongLike => Some(VoteSignal { label: 1, weight: 1.0 }),
            Vote::Indifferent => None,
            Vote::WeakLike => Some(VoteSignal { label: 1, weight: 0.5 }),
            Vote::WeakDislike => Some(VoteSignal { label: 0, weight: 0.5 }),
        }
    }

    #[must_use]
    pub const fn is_informative(self) -> bool {
        self.signal().is_some()
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        matches!(self, Vote::StrongLike | Vote::WeakLike)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Vote::StrongDislike => "no",
            Vote::StrongLike => "yes",
            Vote::Indifferent => "indifferent",
            Vote::WeakLike => "maybe yes",
            Vote::WeakDislike => "maybe no",
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.label())
    }
}
