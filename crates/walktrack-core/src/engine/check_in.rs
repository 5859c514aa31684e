//! Checkpoint scans: person check-ins, abandonment, team arrival, and the
//! team status recompute that follows each of them.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ProgressEngine;
use crate::error::{EngineError, EngineResult};
use crate::models::{Person, Team, TeamId, TeamStatus, WalkStatus};
use crate::topology::{Route, NOT_DEPARTED};

/// What a checkpoint operator recorded for a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInIntent {
    Arrived,
    GaveUp,
}

impl CheckInIntent {
    /// Walk status this intent produces for a member of a team at `team_point`.
    pub fn resolve(&self, team_point: i8) -> WalkStatus {
        match self {
            CheckInIntent::Arrived if team_point == NOT_DEPARTED => WalkStatus::CheckedIn,
            CheckInIntent::Arrived => WalkStatus::InProgress,
            CheckInIntent::GaveUp => WalkStatus::Abandoned,
        }
    }
}

/// One entry of a batch scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    pub person_id: String,
    pub intent: CheckInIntent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInOutcome {
    pub person_id: String,
    pub walk_status: WalkStatus,
    pub team_id: TeamId,
    pub team_status: TeamStatus,
}

fn ensure_not_finished(person: &Person) -> EngineResult<()> {
    if person.walk_status == WalkStatus::Finished {
        return Err(EngineError::Conflict(format!(
            "person {} has already finished",
            person.id
        )));
    }
    Ok(())
}

impl ProgressEngine {
    /// Record a single person's check-in or abandonment, then recompute
    /// their team.
    pub async fn record_check_in(
        &self,
        person_id: &str,
        intent: CheckInIntent,
    ) -> EngineResult<CheckInOutcome> {
        let mut person = self.person(person_id).await?;
        Self::membership(&person)?;
        ensure_not_finished(&person)?;
        let team = self.team_of(&person).await?;

        person.walk_status = intent.resolve(team.point);
        self.save_person(&person).await?;
        info!(
            person = %person.id,
            team = team.id,
            walk_status = %person.walk_status,
            "Recorded check-in"
        );

        let team = self.recompute_team(team.id).await?;
        Ok(CheckInOutcome {
            person_id: person.id,
            walk_status: person.walk_status,
            team_id: team.id,
            team_status: team.status,
        })
    }

    /// Record a batch of scans from one checkpoint.
    ///
    /// Every entry is validated before anything is written: unknown persons,
    /// persons without a team, finished persons and teams outside
    /// `operator_route` reject the whole batch. Each affected team is
    /// recomputed once, after all of its members were written.
    pub async fn record_check_ins(
        &self,
        batch: &[CheckIn],
        operator_route: Option<Route>,
    ) -> EngineResult<Vec<CheckInOutcome>> {
        let mut teams: HashMap<TeamId, Team> = HashMap::new();
        let mut team_order: Vec<TeamId> = Vec::new();
        let mut staged: Vec<(Person, CheckInIntent, TeamId)> = Vec::with_capacity(batch.len());

        for entry in batch {
            let person = self.person(&entry.person_id).await?;
            let team_id = Self::membership(&person)?;
            ensure_not_finished(&person)?;

            if !teams.contains_key(&team_id) {
                let team = self.team_of(&person).await?;
                team_order.push(team_id);
                teams.insert(team_id, team);
            }
            if let (Some(route), Some(team)) = (operator_route, teams.get(&team_id)) {
                if !route.covers(team.route) {
                    warn!(
                        person = %person.id,
                        team_route = %team.route,
                        operator_route = %route,
                        "Rejected check-in from another route"
                    );
                    return Err(EngineError::Conflict(format!(
                        "team {} walks {}, not {}",
                        team_id, team.route, route
                    )));
                }
            }
            staged.push((person, entry.intent, team_id));
        }
        debug!(entries = staged.len(), teams = team_order.len(), "Batch validated");

        for (person, intent, team_id) in staged.iter_mut() {
            let point = teams
                .get(&*team_id)
                .map(|t| t.point)
                .unwrap_or(NOT_DEPARTED);
            person.walk_status = intent.resolve(point);
            self.save_person(person).await?;
        }

        let mut statuses: HashMap<TeamId, TeamStatus> = HashMap::new();
        for team_id in team_order {
            let team = self.recompute_team(team_id).await?;
            statuses.insert(team_id, team.status);
        }
        info!(entries = staged.len(), teams = statuses.len(), "Recorded check-in batch");

        Ok(staged
            .into_iter()
            .map(|(person, _, team_id)| CheckInOutcome {
                walk_status: person.walk_status,
                team_status: statuses
                    .get(&team_id)
                    .copied()
                    .unwrap_or(TeamStatus::Pending),
                person_id: person.id,
                team_id,
            })
            .collect())
    }

    /// Move a team to `point`.
    ///
    /// The first scan of a pending team fixes its starting head count. A
    /// scan at the route's terminal finishes the team and every member still
    /// walking.
    pub async fn record_team_arrival(&self, team_id: TeamId, point: i8) -> EngineResult<Team> {
        let mut team = self.team(team_id).await?;
        if point < 0 || !team.route.is_valid_point(point) {
            return Err(EngineError::Conflict(format!(
                "checkpoint {} is not on route {}",
                point, team.route
            )));
        }
        if matches!(team.status, TeamStatus::Finished | TeamStatus::Incomplete) {
            return Err(EngineError::Conflict(format!(
                "team {} is {} and can no longer advance",
                team_id, team.status
            )));
        }

        let walking: Vec<Person> = self
            .store
            .persons_in_team(team_id)
            .await?
            .into_iter()
            .filter(|p| p.walk_status != WalkStatus::Abandoned)
            .collect();

        if team.status == TeamStatus::Pending {
            team.start_count = u8::try_from(walking.len()).unwrap_or(u8::MAX);
        }

        let finishing = point == team.route.terminal_index();
        team.status = if finishing {
            TeamStatus::Finished
        } else if point == 0
            && matches!(team.status, TeamStatus::Pending | TeamStatus::CheckedInAtPoint)
        {
            TeamStatus::CheckedInAtPoint
        } else {
            TeamStatus::InProgress
        };
        team.point = point;
        team.updated_at = Utc::now();

        if finishing {
            for mut member in walking {
                if member.walk_status != WalkStatus::Finished {
                    member.walk_status = WalkStatus::Finished;
                    self.save_person(&member).await?;
                }
            }
        }
        debug_assert!(team.is_consistent());
        self.store.save_team(&team).await?;

        info!(
            team = team.id,
            point = team.point,
            location = team.location(),
            status = %team.status,
            "Team reached checkpoint"
        );
        Ok(team)
    }

    /// Re-derive a team's status from a fresh read of its members.
    ///
    /// The team row is only written when the derived status differs, so
    /// repeated or concurrent calls settle on the same value.
    pub async fn recompute_team(&self, team_id: TeamId) -> EngineResult<Team> {
        let mut team = self.store.get_team(team_id).await?.ok_or_else(|| {
            EngineError::DataIntegrity(format!("team {} vanished during recompute", team_id))
        })?;
        let members = self.store.persons_in_team(team_id).await?;

        let derived = self.policy.derive(&team, &members);
        if derived != team.status {
            info!(team = team.id, from = %team.status, to = %derived, "Team status changed");
            team.status = derived;
            self.store.save_team(&team).await?;
        }
        Ok(team)
    }
}
