use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::TeamId;

/// A participant's position within their team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Unassigned,
    Member,
    Captain,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Unassigned => write!(f, "Unassigned"),
            Role::Member => write!(f, "Member"),
            Role::Captain => write!(f, "Captain"),
        }
    }
}

/// Where an individual walker is in the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkStatus {
    NotStarted,
    InProgress,
    /// Scanned while the team was still at the start line.
    CheckedIn,
    Abandoned,
    Finished,
}

impl fmt::Display for WalkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkStatus::NotStarted => write!(f, "Not Started"),
            WalkStatus::InProgress => write!(f, "In Progress"),
            WalkStatus::CheckedIn => write!(f, "Checked In"),
            WalkStatus::Abandoned => write!(f, "Abandoned"),
            WalkStatus::Finished => write!(f, "Finished"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonType {
    Student,
    Staff,
    Alumnus,
}

impl fmt::Display for PersonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonType::Student => write!(f, "Student"),
            PersonType::Staff => write!(f, "Staff"),
            PersonType::Alumnus => write!(f, "Alumnus"),
        }
    }
}

impl FromStr for PersonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" | "1" => Ok(PersonType::Student),
            "staff" | "2" => Ok(PersonType::Staff),
            "alumnus" | "alumni" | "3" => Ok(PersonType::Alumnus),
            other => Err(format!("unknown person type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Campus {
    Zhaohui,
    Pingfeng,
    Moganshan,
}

impl fmt::Display for Campus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Campus::Zhaohui => write!(f, "朝晖"),
            Campus::Pingfeng => write!(f, "屏峰"),
            Campus::Moganshan => write!(f, "莫干山"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub tel: String,
    #[serde(default)]
    pub qq: Option<String>,
    #[serde(default)]
    pub wechat: Option<String>,
}

/// A registered participant.
///
/// `team_id` and `role` move together: a person is either unassigned with no
/// team, or a member/captain of exactly one team. Use [`Person::assign`]
/// rather than setting the fields directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Opaque identity key resolved upstream from the bearer credential.
    pub id: String,
    pub name: String,
    pub gender: Gender,
    /// Student or staff number. Unique across persons.
    pub student_id: String,
    pub campus: Campus,
    /// Identity document number. Unique across persons.
    pub identity: String,
    pub college: String,
    pub contact: Contact,
    pub person_type: PersonType,
    pub role: Role,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    pub walk_status: WalkStatus,
    /// Remaining number of teams this person may still create.
    pub create_quota: u8,
    /// Remaining number of teams this person may still join.
    pub join_quota: u8,
}

impl Person {
    pub fn is_assigned(&self) -> bool {
        self.team_id.is_some()
    }

    pub fn is_captain(&self) -> bool {
        self.role == Role::Captain
    }

    pub fn assign(&mut self, team_id: TeamId, role: Role) {
        debug_assert!(role != Role::Unassigned);
        self.team_id = Some(team_id);
        self.role = role;
    }

    /// Whether the role/team pairing is consistent.
    pub fn membership_consistent(&self) -> bool {
        (self.role == Role::Unassigned) == self.team_id.is_none()
    }
}
