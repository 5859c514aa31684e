//! Overdue and no-show reporting for route marshals.
//!
//! A team is overdue when it is out on a route and has not been scanned
//! for longer than a threshold. A team is a no-show when it submitted its
//! registration but never reached the start line. Both reports return the
//! affected members grouped by the checkpoint their team was last seen at.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::{EngineError, EngineResult};
use crate::models::{Campus, Gender, PersonType, Role, TeamId, WalkStatus};
use crate::store::{RosterFilter, RosterRow, TeamStore};
use crate::topology::{Route, NOT_ARRIVED, NOT_DEPARTED};

/// One member of a reported team, with enough contact detail to reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub person_id: String,
    pub name: String,
    pub gender: Gender,
    pub student_id: String,
    pub campus: Campus,
    pub college: String,
    pub tel: String,
    pub person_type: PersonType,
    pub role: Role,
    pub walk_status: WalkStatus,
    pub team_id: TeamId,
    pub team_name: String,
    pub point: i8,
    pub location: String,
    pub updated_at: DateTime<Utc>,
    pub is_lost: bool,
}

impl From<RosterRow> for RosterEntry {
    fn from(row: RosterRow) -> Self {
        let RosterRow { team, person } = row;
        let location = team.location().to_string();
        Self {
            person_id: person.id,
            name: person.name,
            gender: person.gender,
            student_id: person.student_id,
            campus: person.campus,
            college: person.college,
            tel: person.contact.tel,
            person_type: person.person_type,
            role: person.role,
            walk_status: person.walk_status,
            team_id: team.id,
            team_name: team.name,
            point: team.point,
            location,
            updated_at: team.updated_at,
            is_lost: team.is_lost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Submitted teams that never reached the start. Sorts first.
    NotArrived,
    Checkpoint,
}

/// Members of reported teams that were last seen at one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointGroup {
    pub kind: GroupKind,
    pub point: i8,
    pub location: String,
    pub members: Vec<RosterEntry>,
}

fn role_rank(role: Role) -> u8 {
    match role {
        Role::Captain => 0,
        Role::Member => 1,
        Role::Unassigned => 2,
    }
}

/// Order members by team, captain first, then by name.
fn sort_members(members: &mut [RosterEntry]) {
    members.sort_by(|a, b| {
        a.team_id
            .cmp(&b.team_id)
            .then_with(|| role_rank(a.role).cmp(&role_rank(b.role)))
            .then_with(|| a.name.cmp(&b.name))
    });
}

fn keep(entry: &RosterEntry, person_type: Option<PersonType>) -> bool {
    person_type.map_or(true, |t| entry.person_type == t)
}

#[derive(Clone)]
pub struct TimeoutScanner {
    teams: Arc<dyn TeamStore>,
}

impl TimeoutScanner {
    pub fn new(teams: Arc<dyn TeamStore>) -> Self {
        Self { teams }
    }

    async fn roster(&self, route: Route, filter: RosterFilter) -> EngineResult<Vec<RosterRow>> {
        self.teams.route_roster(route, filter).await.map_err(|e| {
            error!(route = %route, error = %e, "Roster scan failed");
            EngineError::Unavailable(e)
        })
    }

    /// Members of teams on `route` idle for more than `threshold_minutes`,
    /// grouped by checkpoint in route order.
    pub async fn find_overdue_teams(
        &self,
        route: Route,
        threshold_minutes: u32,
        person_type: Option<PersonType>,
    ) -> EngineResult<Vec<PointGroup>> {
        self.find_overdue_teams_at(route, threshold_minutes, person_type, Utc::now())
            .await
    }

    pub async fn find_overdue_teams_at(
        &self,
        route: Route,
        threshold_minutes: u32,
        person_type: Option<PersonType>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<PointGroup>> {
        let before = now - Duration::minutes(i64::from(threshold_minutes));
        let rows = self.roster(route, RosterFilter::Overdue { before }).await?;

        let mut by_point: BTreeMap<i8, Vec<RosterEntry>> = BTreeMap::new();
        for entry in rows.into_iter().map(RosterEntry::from) {
            if keep(&entry, person_type) {
                by_point.entry(entry.point).or_default().push(entry);
            }
        }

        let groups: Vec<PointGroup> = by_point
            .into_iter()
            .map(|(point, mut members)| {
                sort_members(&mut members);
                PointGroup {
                    kind: GroupKind::Checkpoint,
                    point,
                    location: route.point_name(point).to_string(),
                    members,
                }
            })
            .collect();
        debug!(route = %route, groups = groups.len(), "Overdue scan complete");
        Ok(groups)
    }

    /// Members of submitted teams on `route` that never left pending, as a
    /// single group, or `None` when there are none.
    pub async fn find_no_show_teams(
        &self,
        route: Route,
        person_type: Option<PersonType>,
    ) -> EngineResult<Option<PointGroup>> {
        let rows = self.roster(route, RosterFilter::NoShow).await?;
        let mut members: Vec<RosterEntry> = rows
            .into_iter()
            .map(RosterEntry::from)
            .filter(|e| keep(e, person_type))
            .collect();
        if members.is_empty() {
            return Ok(None);
        }
        sort_members(&mut members);
        Ok(Some(PointGroup {
            kind: GroupKind::NotArrived,
            point: NOT_DEPARTED,
            location: NOT_ARRIVED.to_string(),
            members,
        }))
    }

    /// Overdue groups plus the no-show group, ordered for display.
    pub async fn timeout_report(
        &self,
        route: Route,
        threshold_minutes: u32,
        person_type: Option<PersonType>,
    ) -> EngineResult<Vec<PointGroup>> {
        self.timeout_report_at(route, threshold_minutes, person_type, Utc::now())
            .await
    }

    pub async fn timeout_report_at(
        &self,
        route: Route,
        threshold_minutes: u32,
        person_type: Option<PersonType>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<PointGroup>> {
        let mut groups = self
            .find_overdue_teams_at(route, threshold_minutes, person_type, now)
            .await?;
        if let Some(no_show) = self.find_no_show_teams(route, person_type).await? {
            groups.push(no_show);
        }
        groups.sort_by_key(|g| (g.point, g.kind));
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::walker;
    use crate::error::ErrorKind;
    use crate::models::{Team, TeamDraft, TeamStatus};
    use crate::store::{MemoryStore, PersonStore};

    struct Seed {
        point: i8,
        status: TeamStatus,
        submitted: bool,
        idle_minutes: i64,
    }

    async fn seed(
        store: &MemoryStore,
        route: Route,
        now: DateTime<Utc>,
        seed: Seed,
        members: &[(&str, PersonType)],
    ) -> TeamId {
        let mut team = Team::from_draft(
            TeamDraft {
                name: format!("Team {}", members[0].0),
                password: "pw".to_string(),
                slogan: String::new(),
                allow_match: false,
                route,
            },
            members[0].0,
        );
        team.point = seed.point;
        team.status = seed.status;
        team.submitted = seed.submitted;
        team.updated_at = now - Duration::minutes(seed.idle_minutes);
        let team_id = store.insert_team(&team).await.unwrap();

        for (i, (id, person_type)) in members.iter().enumerate() {
            let mut p = walker(id);
            p.person_type = *person_type;
            p.assign(team_id, if i == 0 { Role::Captain } else { Role::Member });
            store.insert_person(&p).await.unwrap();
        }
        team_id
    }

    fn scanner(store: &MemoryStore) -> TimeoutScanner {
        TimeoutScanner::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_overdue_groups_by_checkpoint() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let route = Route::PingfengHalf;

        let stale = seed(
            &store,
            route,
            now,
            Seed {
                point: 2,
                status: TeamStatus::InProgress,
                submitted: true,
                idle_minutes: 90,
            },
            &[("z-cap", PersonType::Student), ("a-mem", PersonType::Student)],
        )
        .await;
        // Recently scanned.
        seed(
            &store,
            route,
            now,
            Seed {
                point: 2,
                status: TeamStatus::InProgress,
                submitted: true,
                idle_minutes: 10,
            },
            &[("fresh", PersonType::Student)],
        )
        .await;
        // Finished teams are never overdue.
        seed(
            &store,
            route,
            now,
            Seed {
                point: 5,
                status: TeamStatus::Finished,
                submitted: true,
                idle_minutes: 300,
            },
            &[("done", PersonType::Student)],
        )
        .await;

        let groups = scanner(&store)
            .find_overdue_teams_at(route, 60, None, now)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].point, 2);
        assert_eq!(groups[0].location, route.point_name(2));
        let names: Vec<&str> = groups[0]
            .members
            .iter()
            .map(|m| m.person_id.as_str())
            .collect();
        assert_eq!(names, vec!["z-cap", "a-mem"]);
        assert!(groups[0].members.iter().all(|m| m.team_id == stale));
    }

    #[tokio::test]
    async fn test_no_show_group_sorts_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let route = Route::Zhaohui;

        seed(
            &store,
            route,
            now,
            Seed {
                point: 4,
                status: TeamStatus::InProgress,
                submitted: true,
                idle_minutes: 120,
            },
            &[("late", PersonType::Student)],
        )
        .await;
        seed(
            &store,
            route,
            now,
            Seed {
                point: NOT_DEPARTED,
                status: TeamStatus::Pending,
                submitted: true,
                idle_minutes: 500,
            },
            &[("absent", PersonType::Student)],
        )
        .await;
        // Pending but never submitted: neither overdue nor a no-show.
        seed(
            &store,
            route,
            now,
            Seed {
                point: NOT_DEPARTED,
                status: TeamStatus::Pending,
                submitted: false,
                idle_minutes: 500,
            },
            &[("draft", PersonType::Student)],
        )
        .await;

        let report = scanner(&store)
            .timeout_report_at(route, 60, None, now)
            .await
            .unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].kind, GroupKind::NotArrived);
        assert_eq!(report[0].location, NOT_ARRIVED);
        assert_eq!(report[0].members[0].person_id, "absent");
        assert_eq!(report[1].point, 4);
    }

    #[tokio::test]
    async fn test_person_type_filter() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let route = Route::MoganshanFull;
        seed(
            &store,
            route,
            now,
            Seed {
                point: 1,
                status: TeamStatus::InProgress,
                submitted: true,
                idle_minutes: 61,
            },
            &[("stu", PersonType::Student), ("lecturer", PersonType::Staff)],
        )
        .await;

        let groups = scanner(&store)
            .find_overdue_teams_at(route, 60, Some(PersonType::Staff), now)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[0].members[0].person_id, "lecturer");

        let none = scanner(&store)
            .find_overdue_teams_at(route, 60, Some(PersonType::Alumnus), now)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        let err = scanner(&store)
            .timeout_report(Route::Zhaohui, 60, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_empty_route_yields_empty_report() {
        let store = MemoryStore::new();
        store.insert_person(&walker("idle")).await.unwrap();
        let report = scanner(&store)
            .timeout_report(Route::PingfengFull, 60, None)
            .await
            .unwrap();
        assert!(report.is_empty());
    }
}
