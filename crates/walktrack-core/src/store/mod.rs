//! Store-of-record interfaces.
//!
//! The storage engine itself lives outside this crate; the engine only sees
//! these traits. Person and team rows are read and written by key or by
//! filter, and multi-row work goes through an explicit
//! [`StoreTransaction`] that commits all-or-nothing.
//!
//! [`MemoryStore`] is a complete in-process implementation used by tests and
//! the CLI.

pub mod error;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Person, Team, TeamId, TeamStatus, WalkStatus};
use crate::topology::Route;

pub use error::StoreError;
pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Row predicate for the route roster join used by the timeout scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterFilter {
    /// Active teams whose last update is older than `before`.
    Overdue { before: DateTime<Utc> },
    /// Teams that submitted their registration but never left pending.
    NoShow,
}

impl RosterFilter {
    pub fn matches(&self, team: &Team) -> bool {
        match self {
            RosterFilter::Overdue { before } => {
                team.updated_at < *before
                    && !matches!(team.status, TeamStatus::Finished | TeamStatus::Pending)
            }
            RosterFilter::NoShow => team.status == TeamStatus::Pending && team.submitted,
        }
    }
}

/// One member of one team, as returned by the team/person join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub team: Team,
    pub person: Person,
}

#[async_trait]
pub trait PersonStore: Send + Sync {
    async fn get_person(&self, id: &str) -> StoreResult<Option<Person>>;

    /// Overwrite an existing person row.
    async fn save_person(&self, person: &Person) -> StoreResult<()>;

    async fn insert_person(&self, person: &Person) -> StoreResult<()>;

    /// Every current member of a team, read from the store of record.
    async fn persons_in_team(&self, team_id: TeamId) -> StoreResult<Vec<Person>>;

    async fn find_person_by_student_id(&self, student_id: &str) -> StoreResult<Option<Person>>;

    /// Persons sharing any of the unique identity fields.
    async fn find_identity_conflicts(
        &self,
        student_id: &str,
        identity: &str,
        tel: &str,
    ) -> StoreResult<Vec<Person>>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn get_team(&self, id: TeamId) -> StoreResult<Option<Team>>;

    /// Overwrite an existing team row.
    async fn save_team(&self, team: &Team) -> StoreResult<()>;

    /// Team/person join for one route in a single query.
    async fn route_roster(&self, route: Route, filter: RosterFilter) -> StoreResult<Vec<RosterRow>>;
}

/// Combined store handle the progress engine is built on.
#[async_trait]
pub trait WalkStore: PersonStore + TeamStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// A unit of multi-row work. Dropping without commit discards every staged
/// step, same as [`StoreTransaction::rollback`].
#[async_trait]
pub trait StoreTransaction: Send {
    /// Insert a team and return its assigned id. The `id` field is ignored.
    async fn insert_team(&mut self, team: &Team) -> StoreResult<TeamId>;

    async fn save_team(&mut self, team: &Team) -> StoreResult<()>;

    async fn set_captain(&mut self, team_id: TeamId, person_id: &str) -> StoreResult<()>;

    async fn insert_person(&mut self, person: &Person) -> StoreResult<()>;

    async fn save_person(&mut self, person: &Person) -> StoreResult<()>;

    /// Set the walk status of every person whose id starts with `prefix`.
    /// Returns the ids touched.
    async fn set_walk_status_by_id_prefix(
        &mut self,
        prefix: &str,
        status: WalkStatus,
    ) -> StoreResult<Vec<String>>;

    async fn teams_by_name_prefix(&mut self, prefix: &str) -> StoreResult<Vec<Team>>;

    /// Returns the number of teams removed.
    async fn delete_teams_by_name_prefix(&mut self, prefix: &str) -> StoreResult<usize>;

    /// Returns the ids removed.
    async fn delete_persons_by_id_prefix(&mut self, prefix: &str) -> StoreResult<Vec<String>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>);
}
