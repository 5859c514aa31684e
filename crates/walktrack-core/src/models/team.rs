use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TeamId;
use crate::topology::{Route, NOT_DEPARTED};

/// Aggregate status of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// Formed, not yet scanned anywhere.
    Pending,
    InProgress,
    /// Every member gave up.
    Incomplete,
    Finished,
    /// Scanned at the start line.
    CheckedInAtPoint,
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamStatus::Pending => write!(f, "Pending"),
            TeamStatus::InProgress => write!(f, "In Progress"),
            TeamStatus::Incomplete => write!(f, "Incomplete"),
            TeamStatus::Finished => write!(f, "Finished"),
            TeamStatus::CheckedInAtPoint => write!(f, "Checked In"),
        }
    }
}

/// Fields a captain supplies when forming a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDraft {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub slogan: String,
    #[serde(default)]
    pub allow_match: bool,
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Assigned by the store on insert.
    pub id: TeamId,
    pub name: String,
    pub slogan: String,
    pub password: String,
    pub allow_match: bool,
    /// Captain's person id; empty only while a bulk insert back-fills it.
    pub captain: Option<String>,
    pub route: Route,
    /// Current checkpoint index on `route`, or [`NOT_DEPARTED`].
    pub point: i8,
    pub member_count: u8,
    /// Members still walking when the team left the start.
    pub start_count: u8,
    pub status: TeamStatus,
    pub submitted: bool,
    pub updated_at: DateTime<Utc>,
    pub is_lost: bool,
}

impl Team {
    /// A freshly formed team with its captain as the only member.
    pub fn from_draft(draft: TeamDraft, captain: &str) -> Self {
        Self {
            id: 0,
            name: draft.name,
            slogan: draft.slogan,
            password: draft.password,
            allow_match: draft.allow_match,
            captain: Some(captain.to_string()),
            route: draft.route,
            point: NOT_DEPARTED,
            member_count: 1,
            start_count: 0,
            status: TeamStatus::Pending,
            submitted: false,
            updated_at: Utc::now(),
            is_lost: false,
        }
    }

    pub fn at_finish(&self) -> bool {
        self.point == self.route.terminal_index()
    }

    pub fn location(&self) -> &'static str {
        self.route.point_name(self.point)
    }

    /// Checkpoint index is on the route, and a finished team sits at the finish.
    pub fn is_consistent(&self) -> bool {
        self.route.is_valid_point(self.point)
            && (self.status != TeamStatus::Finished || self.at_finish())
    }
}
