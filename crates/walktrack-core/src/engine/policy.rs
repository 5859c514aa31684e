use crate::models::{Person, Team, TeamStatus, WalkStatus};
use crate::topology::NOT_DEPARTED;

/// How a team's aggregate status is derived from its members.
///
/// Implementations must be pure over their inputs: deriving twice from the
/// same snapshot gives the same answer, which is what lets concurrent
/// check-ins race on the team row and still converge.
pub trait RecomputePolicy: Send + Sync {
    fn derive(&self, team: &Team, members: &[Person]) -> TeamStatus;
}

/// Full-snapshot recompute without locking.
///
/// A team with nobody left walking is `Incomplete`. An `Incomplete` team
/// that has a walker again goes back to the live status for its checkpoint.
/// Every other status is left alone, as is a team with no members.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotRecompute;

/// Status of a team that is still on the route at `point`.
fn live_status(point: i8) -> TeamStatus {
    match point {
        NOT_DEPARTED => TeamStatus::Pending,
        0 => TeamStatus::CheckedInAtPoint,
        _ => TeamStatus::InProgress,
    }
}

impl RecomputePolicy for SnapshotRecompute {
    fn derive(&self, team: &Team, members: &[Person]) -> TeamStatus {
        if members.is_empty() {
            return team.status;
        }
        let walking = members
            .iter()
            .filter(|p| p.walk_status != WalkStatus::Abandoned)
            .count();
        match (walking, team.status) {
            (0, _) => TeamStatus::Incomplete,
            (_, TeamStatus::Incomplete) => live_status(team.point),
            (_, current) => current,
        }
    }
}
