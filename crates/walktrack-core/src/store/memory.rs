//! In-process store of record.
//!
//! Rows live in ordered maps behind a tokio `RwLock`, so reads are
//! deterministic and every single-row write is linearized by the lock.
//! Transactions stage their steps against a private snapshot (so they read
//! their own writes) and replay the step log onto the live tables at commit;
//! if any step fails on replay nothing is applied.
//!
//! Failure switches let tests make reads, writes or commits fail.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    PersonStore, RosterFilter, RosterRow, StoreError, StoreResult, StoreTransaction, TeamStore,
    WalkStore,
};
use crate::models::{Person, Team, TeamId, WalkStatus};
use crate::topology::Route;

#[derive(Debug, Default)]
struct FaultSwitches {
    reads: AtomicBool,
    person_writes: AtomicBool,
    team_writes: AtomicBool,
    commits: AtomicBool,
}

impl FaultSwitches {
    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Backend(format!("injected {} failure", what)))
        } else {
            Ok(())
        }
    }

    fn read(&self) -> StoreResult<()> {
        Self::check(&self.reads, "read")
    }

    fn person_write(&self) -> StoreResult<()> {
        Self::check(&self.person_writes, "person write")
    }

    fn team_write(&self) -> StoreResult<()> {
        Self::check(&self.team_writes, "team write")
    }
}

/// Two persons collide if they share a student number, identity document or tel.
fn shares_unique_field(a: &Person, b: &Person) -> bool {
    (!a.student_id.is_empty() && a.student_id == b.student_id)
        || a.identity == b.identity
        || a.contact.tel == b.contact.tel
}

#[derive(Debug, Clone, Default)]
struct Tables {
    persons: BTreeMap<String, Person>,
    teams: BTreeMap<TeamId, Team>,
}

impl Tables {
    fn insert_person(&mut self, person: &Person) -> StoreResult<()> {
        if self.persons.contains_key(&person.id) {
            return Err(StoreError::Duplicate(format!("person {}", person.id)));
        }
        if let Some(other) = self.persons.values().find(|p| shares_unique_field(p, person)) {
            return Err(StoreError::Duplicate(format!(
                "person {} shares identity fields with {}",
                person.id, other.id
            )));
        }
        self.persons.insert(person.id.clone(), person.clone());
        Ok(())
    }

    fn save_person(&mut self, person: &Person) -> StoreResult<()> {
        if let Some(other) = self
            .persons
            .values()
            .find(|p| p.id != person.id && shares_unique_field(p, person))
        {
            return Err(StoreError::Duplicate(format!(
                "person {} shares identity fields with {}",
                person.id, other.id
            )));
        }
        match self.persons.get_mut(&person.id) {
            Some(row) => {
                *row = person.clone();
                Ok(())
            }
            None => Err(StoreError::MissingRow(format!("person {}", person.id))),
        }
    }

    fn insert_team(&mut self, id: TeamId, team: &Team) -> StoreResult<()> {
        if self.teams.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("team {}", id)));
        }
        let mut row = team.clone();
        row.id = id;
        self.teams.insert(id, row);
        Ok(())
    }

    fn save_team(&mut self, team: &Team) -> StoreResult<()> {
        match self.teams.get_mut(&team.id) {
            Some(row) => {
                *row = team.clone();
                Ok(())
            }
            None => Err(StoreError::MissingRow(format!("team {}", team.id))),
        }
    }

    fn set_captain(&mut self, team_id: TeamId, person_id: &str) -> StoreResult<()> {
        let team = self
            .teams
            .get_mut(&team_id)
            .ok_or_else(|| StoreError::MissingRow(format!("team {}", team_id)))?;
        team.captain = Some(person_id.to_string());
        Ok(())
    }

    fn set_walk_status_by_id_prefix(&mut self, prefix: &str, status: WalkStatus) -> Vec<String> {
        self.persons
            .values_mut()
            .filter(|p| p.id.starts_with(prefix))
            .map(|p| {
                p.walk_status = status;
                p.id.clone()
            })
            .collect()
    }

    fn teams_by_name_prefix(&self, prefix: &str) -> Vec<Team> {
        self.teams
            .values()
            .filter(|t| t.name.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn delete_teams_by_name_prefix(&mut self, prefix: &str) -> usize {
        let before = self.teams.len();
        self.teams.retain(|_, t| !t.name.starts_with(prefix));
        before - self.teams.len()
    }

    fn delete_persons_by_id_prefix(&mut self, prefix: &str) -> Vec<String> {
        let removed: Vec<String> = self
            .persons
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect();
        for id in &removed {
            self.persons.remove(id);
        }
        removed
    }

    fn roster(&self, route: Route, filter: RosterFilter) -> Vec<RosterRow> {
        let teams: BTreeMap<TeamId, &Team> = self
            .teams
            .values()
            .filter(|t| t.route == route && filter.matches(t))
            .map(|t| (t.id, t))
            .collect();

        let mut rows: Vec<RosterRow> = self
            .persons
            .values()
            .filter_map(|p| {
                let team = teams.get(&p.team_id?)?;
                Some(RosterRow {
                    team: (*team).clone(),
                    person: p.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.team
                .id
                .cmp(&b.team.id)
                .then_with(|| a.person.id.cmp(&b.person.id))
        });
        rows
    }
}

#[derive(Debug, Clone)]
enum TxOp {
    InsertTeam(TeamId, Team),
    SaveTeam(Team),
    SetCaptain(TeamId, String),
    InsertPerson(Person),
    SavePerson(Person),
    SetWalkStatus(String, WalkStatus),
    DeleteTeams(String),
    DeletePersons(String),
}

impl TxOp {
    fn apply(&self, tables: &mut Tables) -> StoreResult<()> {
        match self {
            TxOp::InsertTeam(id, team) => tables.insert_team(*id, team),
            TxOp::SaveTeam(team) => tables.save_team(team),
            TxOp::SetCaptain(team_id, person_id) => tables.set_captain(*team_id, person_id),
            TxOp::InsertPerson(person) => tables.insert_person(person),
            TxOp::SavePerson(person) => tables.save_person(person),
            TxOp::SetWalkStatus(prefix, status) => {
                tables.set_walk_status_by_id_prefix(prefix, *status);
                Ok(())
            }
            TxOp::DeleteTeams(prefix) => {
                tables.delete_teams_by_name_prefix(prefix);
                Ok(())
            }
            TxOp::DeletePersons(prefix) => {
                tables.delete_persons_by_id_prefix(prefix);
                Ok(())
            }
        }
    }
}

/// Shared handle; clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    next_team_id: Arc<AtomicU64>,
    faults: Arc<FaultSwitches>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_team_id(&self) -> TeamId {
        self.next_team_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Insert a team outside of any transaction and return its id.
    pub async fn insert_team(&self, team: &Team) -> StoreResult<TeamId> {
        self.faults.team_write()?;
        let id = self.allocate_team_id();
        self.tables.write().await.insert_team(id, team)?;
        Ok(id)
    }

    pub async fn person_count(&self) -> usize {
        self.tables.read().await.persons.len()
    }

    pub async fn team_count(&self) -> usize {
        self.tables.read().await.teams.len()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.faults.reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_person_writes(&self, fail: bool) {
        self.faults.person_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_team_writes(&self, fail: bool) {
        self.faults.team_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.faults.commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersonStore for MemoryStore {
    async fn get_person(&self, id: &str) -> StoreResult<Option<Person>> {
        self.faults.read()?;
        Ok(self.tables.read().await.persons.get(id).cloned())
    }

    async fn save_person(&self, person: &Person) -> StoreResult<()> {
        self.faults.person_write()?;
        self.tables.write().await.save_person(person)
    }

    async fn insert_person(&self, person: &Person) -> StoreResult<()> {
        self.faults.person_write()?;
        self.tables.write().await.insert_person(person)
    }

    async fn persons_in_team(&self, team_id: TeamId) -> StoreResult<Vec<Person>> {
        self.faults.read()?;
        Ok(self
            .tables
            .read()
            .await
            .persons
            .values()
            .filter(|p| p.team_id == Some(team_id))
            .cloned()
            .collect())
    }

    async fn find_person_by_student_id(&self, student_id: &str) -> StoreResult<Option<Person>> {
        self.faults.read()?;
        Ok(self
            .tables
            .read()
            .await
            .persons
            .values()
            .find(|p| p.student_id == student_id)
            .cloned())
    }

    async fn find_identity_conflicts(
        &self,
        student_id: &str,
        identity: &str,
        tel: &str,
    ) -> StoreResult<Vec<Person>> {
        self.faults.read()?;
        Ok(self
            .tables
            .read()
            .await
            .persons
            .values()
            .filter(|p| {
                (!student_id.is_empty() && p.student_id == student_id)
                    || p.identity == identity
                    || p.contact.tel == tel
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn get_team(&self, id: TeamId) -> StoreResult<Option<Team>> {
        self.faults.read()?;
        Ok(self.tables.read().await.teams.get(&id).cloned())
    }

    async fn save_team(&self, team: &Team) -> StoreResult<()> {
        self.faults.team_write()?;
        self.tables.write().await.save_team(team)
    }

    async fn route_roster(&self, route: Route, filter: RosterFilter) -> StoreResult<Vec<RosterRow>> {
        self.faults.read()?;
        Ok(self.tables.read().await.roster(route, filter))
    }
}

#[async_trait]
impl WalkStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.faults.read()?;
        let staged = self.tables.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged,
            ops: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    staged: Tables,
    ops: Vec<TxOp>,
}

impl MemoryTransaction {
    fn stage(&mut self, op: TxOp) -> StoreResult<()> {
        op.apply(&mut self.staged)?;
        self.ops.push(op);
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_team(&mut self, team: &Team) -> StoreResult<TeamId> {
        self.store.faults.team_write()?;
        let id = self.store.allocate_team_id();
        self.stage(TxOp::InsertTeam(id, team.clone()))?;
        Ok(id)
    }

    async fn save_team(&mut self, team: &Team) -> StoreResult<()> {
        self.store.faults.team_write()?;
        self.stage(TxOp::SaveTeam(team.clone()))
    }

    async fn set_captain(&mut self, team_id: TeamId, person_id: &str) -> StoreResult<()> {
        self.store.faults.team_write()?;
        self.stage(TxOp::SetCaptain(team_id, person_id.to_string()))
    }

    async fn insert_person(&mut self, person: &Person) -> StoreResult<()> {
        self.store.faults.person_write()?;
        self.stage(TxOp::InsertPerson(person.clone()))
    }

    async fn save_person(&mut self, person: &Person) -> StoreResult<()> {
        self.store.faults.person_write()?;
        self.stage(TxOp::SavePerson(person.clone()))
    }

    async fn set_walk_status_by_id_prefix(
        &mut self,
        prefix: &str,
        status: WalkStatus,
    ) -> StoreResult<Vec<String>> {
        self.store.faults.person_write()?;
        let touched = self.staged.set_walk_status_by_id_prefix(prefix, status);
        self.ops.push(TxOp::SetWalkStatus(prefix.to_string(), status));
        Ok(touched)
    }

    async fn teams_by_name_prefix(&mut self, prefix: &str) -> StoreResult<Vec<Team>> {
        self.store.faults.read()?;
        Ok(self.staged.teams_by_name_prefix(prefix))
    }

    async fn delete_teams_by_name_prefix(&mut self, prefix: &str) -> StoreResult<usize> {
        self.store.faults.team_write()?;
        let removed = self.staged.delete_teams_by_name_prefix(prefix);
        self.ops.push(TxOp::DeleteTeams(prefix.to_string()));
        Ok(removed)
    }

    async fn delete_persons_by_id_prefix(&mut self, prefix: &str) -> StoreResult<Vec<String>> {
        self.store.faults.person_write()?;
        let removed = self.staged.delete_persons_by_id_prefix(prefix);
        self.ops.push(TxOp::DeletePersons(prefix.to_string()));
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if self.store.faults.commits.load(Ordering::SeqCst) {
            return Err(StoreError::CommitFailed("injected commit failure".to_string()));
        }

        let mut live = self.store.tables.write().await;
        let mut next = live.clone();
        for op in &self.ops {
            op.apply(&mut next)?;
        }
        *live = next;
        debug!(steps = self.ops.len(), "Committed transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        debug!(steps = self.ops.len(), "Rolled back transaction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Campus, Contact, Gender, PersonType, Role, TeamDraft, TeamStatus};
    use chrono::{Duration, Utc};

    fn person(id: &str, student_id: &str) -> Person {
        Person {
            id: id.to_string(),
            name: id.to_string(),
            gender: Gender::Male,
            student_id: student_id.to_string(),
            campus: Campus::Zhaohui,
            identity: format!("id-{}", id),
            college: "理学院".to_string(),
            contact: Contact {
                tel: format!("tel-{}", id),
                ..Default::default()
            },
            person_type: PersonType::Student,
            role: Role::Unassigned,
            team_id: None,
            walk_status: WalkStatus::NotStarted,
            create_quota: 2,
            join_quota: 5,
        }
    }

    fn team(name: &str, route: Route) -> Team {
        Team::from_draft(
            TeamDraft {
                name: name.to_string(),
                password: "pw".to_string(),
                slogan: String::new(),
                allow_match: false,
                route,
            },
            "",
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_identity_fields() {
        let store = MemoryStore::new();
        store.insert_person(&person("a", "1001")).await.unwrap();

        let err = store.insert_person(&person("b", "1001")).await.unwrap_err();
        assert!(err.is_duplicate());

        let err = store.insert_person(&person("a", "2002")).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_save_missing_row_fails() {
        let store = MemoryStore::new();
        let err = store.save_person(&person("ghost", "9")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingRow(_)));
    }

    #[tokio::test]
    async fn test_transaction_commit_applies_all_steps() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let team_id = tx.insert_team(&team("T", Route::Zhaohui)).await.unwrap();
        let mut p = person("a", "1");
        p.assign(team_id, Role::Captain);
        tx.insert_person(&p).await.unwrap();
        tx.set_captain(team_id, "a").await.unwrap();

        assert_eq!(store.team_count().await, 0);
        tx.commit().await.unwrap();

        let saved = store.get_team(team_id).await.unwrap().unwrap();
        assert_eq!(saved.captain.as_deref(), Some("a"));
        assert_eq!(store.persons_in_team(team_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_steps() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_team(&team("T", Route::Zhaohui)).await.unwrap();
        tx.insert_person(&person("a", "1")).await.unwrap();
        tx.rollback().await;

        assert_eq!(store.team_count().await, 0);
        assert_eq!(store.person_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_conflict_applies_nothing() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_team(&team("T", Route::Zhaohui)).await.unwrap();
        tx.insert_person(&person("a", "1")).await.unwrap();

        // Someone else takes the id before commit.
        store.insert_person(&person("a", "2")).await.unwrap();

        assert!(tx.commit().await.is_err());
        assert_eq!(store.team_count().await, 0);
        assert_eq!(store.person_count().await, 1);
    }

    #[tokio::test]
    async fn test_roster_join_filters_by_route_and_status() {
        let store = MemoryStore::new();
        let mut stale = team("stale", Route::PingfengHalf);
        stale.status = TeamStatus::InProgress;
        stale.updated_at = Utc::now() - Duration::minutes(90);
        let stale_id = store.insert_team(&stale).await.unwrap();

        let mut other_route = stale.clone();
        other_route.route = Route::Zhaohui;
        let other_id = store.insert_team(&other_route).await.unwrap();

        for (pid, tid) in [("a", stale_id), ("b", stale_id), ("c", other_id)] {
            let mut p = person(pid, pid);
            p.assign(tid, Role::Member);
            store.insert_person(&p).await.unwrap();
        }

        let before = Utc::now() - Duration::minutes(60);
        let rows = store
            .route_roster(Route::PingfengHalf, RosterFilter::Overdue { before })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.team.id == stale_id));

        let none = store
            .route_roster(Route::PingfengHalf, RosterFilter::NoShow)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_fault_switches() {
        let store = MemoryStore::new();
        store.insert_person(&person("a", "1")).await.unwrap();

        store.fail_reads(true);
        assert!(store.get_person("a").await.is_err());
        store.fail_reads(false);

        store.fail_person_writes(true);
        assert!(store.save_person(&person("a", "1")).await.is_err());
        store.fail_person_writes(false);

        store.fail_commits(true);
        let tx = store.begin().await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::CommitFailed(_))));
    }
}
