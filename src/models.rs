use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub capacity: usize,
}

/// Component scores of one applicant. The total is always derived from the
/// components and never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scores {
    pub physics: i32,
    pub russian: i32,
    pub math: i32,
    pub individual: i32,
}

impl Scores {
    pub fn total(&self) -> i32 {
        self.physics + self.russian + self.math + self.individual
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applicant {
    pub id: i64,
    pub scores: Scores,
}

impl Applicant {
    pub fn total(&self) -> i32 {
        self.scores.total()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub applicant_id: i64,
    pub program: String,
    pub priority: i32,
    pub consent: bool,
}

/// A consenting application joined with its applicant's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedApplication {
    pub applicant_id: i64,
    pub priority: i32,
    pub total: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    Score(i32),
    /// Not enough consenting applicants to fill every seat.
    Insufficient,
}

impl Cutoff {
    pub fn from_column(score: Option<i32>) -> Self {
        score.map_or(Cutoff::Insufficient, Cutoff::Score)
    }

    pub fn as_column(&self) -> Option<i32> {
        match self {
            Cutoff::Score(score) => Some(*score),
            Cutoff::Insufficient => None,
        }
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cutoff::Score(score) => write!(f, "{score}"),
            Cutoff::Insufficient => write!(f, "insufficient"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassingScore {
    pub program: String,
    pub snapshot: String,
    pub snapshot_ordinal: i32,
    pub cutoff: Cutoff,
}
