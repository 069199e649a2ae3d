//! Vote ledger: one ballot per (voter, role) for a single story.

use std::collections::BTreeSet;

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vote {
    pub story_id: i64,
    pub voter_id: String,
    pub role: Role,
    pub value: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub cast_at: OffsetDateTime,
}

/// A ballot with its value withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ballot {
    pub voter_id: String,
    pub role: Role,
}

/// Per-role vote summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleTally {
    pub role: Role,
    /// 1 when the role has an effective vote, else 0.
    pub votes: u32,
    /// Number of participants who voted this role.
    pub ballots: u32,
    pub latest_voter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub roles: Vec<RoleTally>,
    pub completed: usize,
    pub expected: usize,
    pub quorum_reached: bool,
}

/// Ballots of one story, kept in cast order.
///
/// Re-casting the same (voter, role) replaces the earlier ballot and moves it
/// to the end, so the last entry for a role is always its effective vote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteLedger {
    votes: Vec<Vote>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored votes; callers pass them in cast order.
    pub fn from_votes(votes: Vec<Vote>) -> Self {
        let mut ledger = Self::new();
        for vote in votes {
            ledger.upsert(vote);
        }
        ledger
    }

    pub fn upsert(&mut self, vote: Vote) {
        self.votes
            .retain(|v| !(v.voter_id == vote.voter_id && v.role == vote.role));
        self.votes.push(vote);
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    pub fn ballots(&self) -> Vec<Ballot> {
        self.votes
            .iter()
            .map(|v| Ballot {
                voter_id: v.voter_id.clone(),
                role: v.role.clone(),
            })
            .collect()
    }

    /// Votes cast by one identity, values included.
    pub fn own_votes(&self, voter_id: &str) -> Vec<Vote> {
        self.votes
            .iter()
            .filter(|v| v.voter_id == voter_id)
            .cloned()
            .collect()
    }

    /// Most recently cast ballot for a role.
    pub fn effective(&self, role: &Role) -> Option<&Vote> {
        self.votes.iter().rev().find(|v| &v.role == role)
    }

    pub fn tally(&self, required: &BTreeSet<Role>) -> Tally {
        let roles: Vec<RoleTally> = required
            .iter()
            .map(|role| {
                let ballots = self.votes.iter().filter(|v| &v.role == role).count() as u32;
                let latest = self.effective(role);
                RoleTally {
                    role: role.clone(),
                    votes: u32::from(latest.is_some()),
                    ballots,
                    latest_voter: latest.map(|v| v.voter_id.clone()),
                }
            })
            .collect();
        let completed = roles.iter().filter(|r| r.votes > 0).count();
        let expected = required.len();
        Tally {
            roles,
            completed,
            expected,
            quorum_reached: expected > 0 && completed == expected,
        }
    }
}
