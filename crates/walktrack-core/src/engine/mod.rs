//! Team progress engine.
//!
//! `ProgressEngine` owns the person → team state machine: check-ins and
//! abandonment at checkpoints, team arrival and completion, roster changes,
//! and the rehearsal cohort tooling. All collaborators are injected, and the
//! engine itself is a cheap `Clone` handle that can serve many checkpoint
//! devices concurrently.
//!
//! Person records are read and written through the [`CacheAside`]
//! discipline. Team aggregation always reads members straight from the
//! store.

pub mod check_in;
pub mod cohort;
pub mod policy;
pub mod roster;

use std::sync::Arc;

use tracing::error;

use crate::cache::{CacheAside, KeyValueCache};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{Person, Team, TeamId};
use crate::notify::Notifier;
use crate::store::{StoreTransaction, WalkStore};

pub use check_in::{CheckIn, CheckInIntent, CheckInOutcome};
pub use cohort::CohortSummary;
pub use policy::{RecomputePolicy, SnapshotRecompute};
pub use roster::{ProfileUpdate, Registration};

/// Cache namespace for person records.
const PERSON_NAMESPACE: &str = "person";

#[derive(Clone)]
pub struct ProgressEngine {
    store: Arc<dyn WalkStore>,
    persons: CacheAside<Person>,
    notifier: Arc<dyn Notifier>,
    policy: Arc<dyn RecomputePolicy>,
    config: EngineConfig,
}

impl ProgressEngine {
    pub fn new(
        store: Arc<dyn WalkStore>,
        cache: Arc<dyn KeyValueCache>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            persons: CacheAside::new(cache, PERSON_NAMESPACE, config.cache_ttl()),
            notifier,
            policy: Arc::new(SnapshotRecompute),
            config,
        }
    }

    /// Swap the team aggregation policy.
    pub fn with_policy(mut self, policy: Arc<dyn RecomputePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Person by id, cache first.
    pub async fn person(&self, id: &str) -> EngineResult<Person> {
        self.persons
            .get(id, || self.store.get_person(id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("person {}", id)))
    }

    pub async fn team(&self, id: TeamId) -> EngineResult<Team> {
        self.store
            .get_team(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("team {}", id)))
    }

    /// Write a person through to the store, refreshing a cached copy.
    async fn save_person(&self, person: &Person) -> EngineResult<()> {
        self.persons
            .put(&person.id, person, || self.store.save_person(person))
            .await?;
        Ok(())
    }

    /// Stage `person` as the last step of `tx`, commit, and refresh a cached
    /// copy once the commit went through.
    async fn commit_with_person(
        &self,
        mut tx: Box<dyn StoreTransaction>,
        person: &Person,
    ) -> EngineResult<()> {
        self.persons
            .put(&person.id, person, move || async move {
                tx.save_person(person).await?;
                tx.commit().await
            })
            .await?;
        Ok(())
    }

    /// Team id a person belongs to, or a conflict if they have none.
    fn membership(person: &Person) -> EngineResult<TeamId> {
        person
            .team_id
            .ok_or_else(|| EngineError::Conflict(format!("person {} has not joined a team", person.id)))
    }

    /// The team a person references. A dangling reference is a data
    /// integrity failure, not a missing entity.
    async fn team_of(&self, person: &Person) -> EngineResult<Team> {
        let team_id = Self::membership(person)?;
        match self.store.get_team(team_id).await? {
            Some(team) => Ok(team),
            None => {
                error!(person = %person.id, team = team_id, "Person references a missing team");
                Err(EngineError::DataIntegrity(format!(
                    "person {} references missing team {}",
                    person.id, team_id
                )))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use super::ProgressEngine;
    use crate::cache::MemoryCache;
    use crate::config::EngineConfig;
    use crate::models::{
        Campus, Contact, Gender, Person, PersonType, Role, Team, TeamDraft, TeamId, TeamStatus,
        WalkStatus,
    };
    use crate::notify::testing::RecordingNotifier;
    use crate::store::{MemoryStore, PersonStore};
    use crate::topology::Route;

    pub struct Harness {
        pub store: MemoryStore,
        pub cache: MemoryCache,
        pub notifier: Arc<RecordingNotifier>,
        pub engine: ProgressEngine,
    }

    pub fn harness() -> Harness {
        let store = MemoryStore::new();
        let cache = MemoryCache::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = ProgressEngine::new(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            notifier.clone(),
            EngineConfig::default(),
        );
        Harness {
            store,
            cache,
            notifier,
            engine,
        }
    }

    /// An unassigned student whose unique fields derive from `id`.
    pub fn walker(id: &str) -> Person {
        Person {
            id: id.to_string(),
            name: format!("Walker {}", id),
            gender: Gender::Male,
            student_id: format!("sid-{}", id),
            campus: Campus::Pingfeng,
            identity: format!("doc-{}", id),
            college: "计算机学院".to_string(),
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

    pub fn draft(name: &str, route: Route) -> TeamDraft {
        TeamDraft {
            name: name.to_string(),
            password: "secret".to_string(),
            slogan: String::new(),
            allow_match: false,
            route,
        }
    }

    /// Insert a team on `route` at `point` with the given members; the first
    /// member is captain.
    pub async fn seed_team(
        store: &MemoryStore,
        route: Route,
        point: i8,
        status: TeamStatus,
        members: &[(&str, WalkStatus)],
    ) -> TeamId {
        let mut team = Team::from_draft(draft("Seeded", route), members[0].0);
        team.point = point;
        team.status = status;
        team.member_count = members.len() as u8;
        let team_id = store.insert_team(&team).await.unwrap();

        for (i, (id, status)) in members.iter().enumerate() {
            let mut person = walker(id);
            person.assign(team_id, if i == 0 { Role::Captain } else { Role::Member });
            person.walk_status = *status;
            store.insert_person(&person).await.unwrap();
        }
        team_id
    }
}
