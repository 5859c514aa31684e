//! Rehearsal cohort: synthetic teams for load and dashboard drills.
//!
//! Cohort teams are recognised by the configured name prefix and cohort
//! persons by the configured id prefix, so a whole cohort can be advanced or
//! removed without touching real registrations. Each operation runs in a
//! single store transaction.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::info;

use super::ProgressEngine;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::models::{
    Campus, Contact, Gender, Person, PersonType, Role, Team, TeamId, TeamStatus, WalkStatus,
};
use crate::store::{StoreResult, StoreTransaction};
use crate::topology::Route;

/// Rows touched by a bulk cohort operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CohortSummary {
    pub teams: usize,
    pub persons: usize,
}

/// A team and its members before ids are assigned. The first member is the
/// captain.
struct PlannedTeam {
    team: Team,
    members: Vec<Person>,
}

fn random_digits(rng: &mut impl Rng) -> String {
    format!("{:011}", rng.gen_range(0..100_000_000_000u64))
}

fn plan_cohort(count: usize, config: &EngineConfig) -> Vec<PlannedTeam> {
    let mut rng = rand::thread_rng();
    let campuses = [Campus::Zhaohui, Campus::Pingfeng, Campus::Moganshan];

    (0..count)
        .map(|i| {
            let route = Route::ALL[rng.gen_range(0..Route::ALL.len())];
            let campus = campuses[rng.gen_range(0..campuses.len())];
            let team = Team {
                id: 0,
                name: format!("{}{}", config.test_team_prefix, i),
                slogan: "123".to_string(),
                password: "test".to_string(),
                allow_match: false,
                captain: None,
                route,
                point: 0,
                member_count: config.test_team_size,
                start_count: 0,
                status: TeamStatus::Pending,
                submitted: false,
                updated_at: Utc::now(),
                is_lost: false,
            };
            let members = (0..config.test_team_size)
                .map(|j| Person {
                    id: format!("{}{}team{}", config.test_person_prefix, i, j),
                    name: format!("{}{}队员{}", config.test_team_prefix, i, j),
                    gender: Gender::Male,
                    student_id: random_digits(&mut rng),
                    campus,
                    identity: format!("{}{}", config.test_person_prefix, random_digits(&mut rng)),
                    college: "计算机学院".to_string(),
                    contact: Contact {
                        tel: random_digits(&mut rng),
                        qq: Some("123".to_string()),
                        wechat: Some("123".to_string()),
                    },
                    person_type: PersonType::Student,
                    role: Role::Unassigned,
                    team_id: None,
                    walk_status: WalkStatus::NotStarted,
                    create_quota: 1,
                    join_quota: 1,
                })
                .collect();
            PlannedTeam { team, members }
        })
        .collect()
}

/// Put every cohort team somewhere along its route with a last update up to
/// a day old.
fn scatter(teams: Vec<Team>, now: DateTime<Utc>) -> Vec<Team> {
    let mut rng = rand::thread_rng();
    teams
        .into_iter()
        .map(|mut team| {
            team.status = TeamStatus::InProgress;
            team.submitted = true;
            team.point = rng.gen_range(0..team.route.terminal_index());
            team.updated_at = now
                - Duration::minutes(rng.gen_range(0..60))
                - Duration::hours(rng.gen_range(0..24));
            team
        })
        .collect()
}

async fn stage_cohort(
    tx: &mut dyn StoreTransaction,
    plan: Vec<PlannedTeam>,
) -> StoreResult<Vec<TeamId>> {
    let mut ids = Vec::with_capacity(plan.len());
    for planned in &plan {
        ids.push(tx.insert_team(&planned.team).await?);
    }

    for (planned, team_id) in plan.into_iter().zip(ids.iter().copied()) {
        for (j, mut member) in planned.members.into_iter().enumerate() {
            let role = if j == 0 { Role::Captain } else { Role::Member };
            member.assign(team_id, role);
            tx.insert_person(&member).await?;
            if role == Role::Captain {
                tx.set_captain(team_id, &member.id).await?;
            }
        }
    }
    Ok(ids)
}

async fn stage_advance(
    tx: &mut dyn StoreTransaction,
    config: &EngineConfig,
) -> StoreResult<(Vec<String>, usize)> {
    let touched = tx
        .set_walk_status_by_id_prefix(&config.test_person_prefix, WalkStatus::InProgress)
        .await?;
    let teams = scatter(
        tx.teams_by_name_prefix(&config.test_team_prefix).await?,
        Utc::now(),
    );
    for team in &teams {
        tx.save_team(team).await?;
    }
    Ok((touched, teams.len()))
}

async fn stage_delete(
    tx: &mut dyn StoreTransaction,
    config: &EngineConfig,
) -> StoreResult<(usize, Vec<String>)> {
    let teams = tx
        .delete_teams_by_name_prefix(&config.test_team_prefix)
        .await?;
    let persons = tx
        .delete_persons_by_id_prefix(&config.test_person_prefix)
        .await?;
    Ok((teams, persons))
}

/// Commit `tx` if staging succeeded, otherwise roll it back.
async fn finish<T: Send>(
    tx: Box<dyn StoreTransaction>,
    staged: StoreResult<T>,
) -> EngineResult<T> {
    match staged {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback().await;
            Err(e.into())
        }
    }
}

impl ProgressEngine {
    /// Create `count` pending rehearsal teams on random routes, each with a
    /// full roster and its first member as captain.
    pub async fn create_test_cohort(&self, count: usize) -> EngineResult<Vec<TeamId>> {
        let plan = plan_cohort(count, &self.config);
        let mut tx = self.store.begin().await?;
        let staged = stage_cohort(tx.as_mut(), plan).await;
        let ids = finish(tx, staged).await?;
        info!(teams = ids.len(), "Created test cohort");
        Ok(ids)
    }

    /// Send every rehearsal team out onto its route at a random checkpoint.
    pub async fn advance_test_cohort(&self) -> EngineResult<CohortSummary> {
        let mut tx = self.store.begin().await?;
        let staged = stage_advance(tx.as_mut(), &self.config).await;
        let (touched, teams) = finish(tx, staged).await?;
        for id in &touched {
            self.persons.invalidate(id).await;
        }
        info!(teams, persons = touched.len(), "Advanced test cohort");
        Ok(CohortSummary {
            teams,
            persons: touched.len(),
        })
    }

    /// Remove every rehearsal team and person.
    pub async fn delete_test_cohort(&self) -> EngineResult<CohortSummary> {
        let mut tx = self.store.begin().await?;
        let staged = stage_delete(tx.as_mut(), &self.config).await;
        let (teams, removed) = finish(tx, staged).await?;
        for id in &removed {
            self.persons.invalidate(id).await;
        }
        info!(teams, persons = removed.len(), "Deleted test cohort");
        Ok(CohortSummary {
            teams,
            persons: removed.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{harness, walker};
    use crate::error::ErrorKind;
    use crate::store::{PersonStore, TeamStore};

    #[tokio::test]
    async fn test_create_cohort_builds_full_rosters() {
        let h = harness();
        let ids = h.engine.create_test_cohort(3).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(h.store.team_count().await, 3);
        assert_eq!(h.store.person_count().await, 12);

        for team_id in ids {
            let team = h.store.get_team(team_id).await.unwrap().unwrap();
            assert_eq!(team.status, TeamStatus::Pending);
            assert!(team.name.starts_with("测试队伍"));

            let members = h.store.persons_in_team(team_id).await.unwrap();
            assert_eq!(members.len(), 4);
            let captains: Vec<&Person> = members.iter().filter(|p| p.is_captain()).collect();
            assert_eq!(captains.len(), 1);
            assert_eq!(team.captain.as_deref(), Some(captains[0].id.as_str()));
            assert!(members.iter().all(|p| p.membership_consistent()));
        }
    }

    #[tokio::test]
    async fn test_advance_scatters_teams_along_route() {
        let h = harness();
        let ids = h.engine.create_test_cohort(5).await.unwrap();
        // Cache a cohort member so the invalidation is observable.
        assert_eq!(
            h.engine.person("test0team1").await.unwrap().walk_status,
            WalkStatus::NotStarted
        );

        let summary = h.engine.advance_test_cohort().await.unwrap();
        assert_eq!(summary, CohortSummary { teams: 5, persons: 20 });
        assert_eq!(
            h.engine.person("test0team1").await.unwrap().walk_status,
            WalkStatus::InProgress
        );

        let now = Utc::now();
        for team_id in ids {
            let team = h.store.get_team(team_id).await.unwrap().unwrap();
            assert_eq!(team.status, TeamStatus::InProgress);
            assert!(team.submitted);
            assert!(team.point >= 0 && team.point < team.route.terminal_index());
            assert!(team.updated_at <= now);
            assert!(team.updated_at > now - Duration::hours(25));
        }
    }

    #[tokio::test]
    async fn test_delete_leaves_real_registrations() {
        let h = harness();
        h.engine.create_test_cohort(2).await.unwrap();
        h.store.insert_person(&walker("real")).await.unwrap();

        let summary = h.engine.delete_test_cohort().await.unwrap();
        assert_eq!(summary, CohortSummary { teams: 2, persons: 8 });
        assert_eq!(h.store.team_count().await, 0);
        assert_eq!(h.store.person_count().await, 1);
        assert!(h.store.get_person("real").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_commit_creates_nothing() {
        let h = harness();
        h.store.fail_commits(true);
        let err = h.engine.create_test_cohort(2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(h.store.team_count().await, 0);
        assert_eq!(h.store.person_count().await, 0);
    }
}
