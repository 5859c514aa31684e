//! Registration and team formation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ProgressEngine;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Campus, Contact, Gender, Person, PersonType, Role, Team, TeamDraft, TeamId, TeamStatus,
    WalkStatus,
};

/// Teams a new registrant may create.
const CREATE_QUOTA: u8 = 2;
/// Teams a new registrant may join.
const JOIN_QUOTA: u8 = 5;

/// Sign-up form for a new walker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub name: String,
    pub gender: Gender,
    #[serde(default)]
    pub student_id: String,
    pub campus: Campus,
    pub identity: String,
    #[serde(default)]
    pub college: String,
    pub contact: Contact,
    pub person_type: PersonType,
}

impl Registration {
    fn into_person(self) -> Person {
        Person {
            id: self.id,
            name: self.name,
            gender: self.gender,
            student_id: self.student_id,
            campus: self.campus,
            identity: self.identity,
            college: self.college,
            contact: self.contact,
            person_type: self.person_type,
            role: Role::Unassigned,
            team_id: None,
            walk_status: WalkStatus::NotStarted,
            create_quota: CREATE_QUOTA,
            join_quota: JOIN_QUOTA,
        }
    }
}

/// Editable profile fields. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub campus: Option<Campus>,
    pub college: Option<String>,
    pub identity: Option<String>,
    pub contact: Option<Contact>,
}

impl ProfileUpdate {
    fn apply(self, person: &mut Person) {
        if let Some(campus) = self.campus {
            person.campus = campus;
        }
        if let Some(college) = self.college {
            person.college = college;
        }
        if let Some(identity) = self.identity {
            person.identity = identity;
        }
        if let Some(contact) = self.contact {
            person.contact = contact;
        }
    }
}

impl ProgressEngine {
    /// Register a new, unassigned walker.
    pub async fn register_person(&self, registration: Registration) -> EngineResult<Person> {
        if self.store.get_person(&registration.id).await?.is_some() {
            return Err(EngineError::Conflict(format!(
                "person {} is already registered",
                registration.id
            )));
        }
        self.ensure_identity_free(
            None,
            &registration.student_id,
            &registration.identity,
            &registration.contact.tel,
        )
        .await?;

        let person = registration.into_person();
        self.store.insert_person(&person).await?;
        info!(person = %person.id, person_type = %person.person_type, "Registered person");
        Ok(person)
    }

    /// Change profile fields, keeping the identity fields unique.
    pub async fn update_profile(
        &self,
        person_id: &str,
        update: ProfileUpdate,
    ) -> EngineResult<Person> {
        let mut person = self.person(person_id).await?;
        update.apply(&mut person);
        self.ensure_identity_free(
            Some(&person.id),
            &person.student_id,
            &person.identity,
            &person.contact.tel,
        )
        .await?;

        self.save_person(&person).await?;
        info!(person = %person.id, "Updated profile");
        Ok(person)
    }

    /// Form a team with `captain_id` as its captain and only member.
    pub async fn create_team(&self, captain_id: &str, draft: TeamDraft) -> EngineResult<Team> {
        let mut captain = self.person(captain_id).await?;
        if captain.is_assigned() {
            return Err(EngineError::Conflict(format!(
                "person {} already belongs to a team",
                captain.id
            )));
        }
        if captain.create_quota == 0 {
            return Err(EngineError::Conflict(format!(
                "person {} has no team creations left",
                captain.id
            )));
        }
        if draft.name.trim().is_empty() {
            return Err(EngineError::Conflict("team name must not be empty".to_string()));
        }

        let mut team = Team::from_draft(draft, &captain.id);
        let mut tx = self.store.begin().await?;
        team.id = match tx.insert_team(&team).await {
            Ok(id) => id,
            Err(e) => {
                tx.rollback().await;
                return Err(e.into());
            }
        };

        captain.assign(team.id, Role::Captain);
        captain.create_quota -= 1;
        self.commit_with_person(tx, &captain).await?;

        info!(team = team.id, captain = %captain.id, route = %team.route, "Created team");
        Ok(team)
    }

    /// Add the person holding `student_id` to the captain's team.
    ///
    /// The member count and the new member's assignment are written in one
    /// transaction. Both parties are notified afterwards.
    pub async fn add_member(&self, captain_id: &str, student_id: &str) -> EngineResult<Team> {
        let captain = self.person(captain_id).await?;
        if !captain.is_captain() {
            return Err(EngineError::Conflict(format!(
                "person {} is not a team captain",
                captain.id
            )));
        }
        let mut team = self.team_of(&captain).await?;
        if team.submitted && team.member_count >= self.config.max_team_size {
            return Err(EngineError::Conflict(format!(
                "team {} is full ({} members)",
                team.id, team.member_count
            )));
        }
        if captain.student_id == student_id {
            return Err(EngineError::Conflict(
                "a captain cannot add themselves".to_string(),
            ));
        }

        let stored = self
            .store
            .find_person_by_student_id(student_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("person with student id {}", student_id)))?;
        let mut member = self.person(&stored.id).await?;
        if member.is_assigned() {
            return Err(EngineError::Conflict(format!(
                "person {} already belongs to a team",
                member.id
            )));
        }
        if captain.person_type == PersonType::Student && member.person_type == PersonType::Staff {
            return Err(EngineError::Conflict(
                "a student-led team cannot add staff".to_string(),
            ));
        }

        team.member_count = team.member_count.checked_add(1).ok_or_else(|| {
            EngineError::Conflict(format!("team {} cannot take more members", team.id))
        })?;
        member.assign(team.id, Role::Member);

        let mut tx = self.store.begin().await?;
        if let Err(e) = tx.save_team(&team).await {
            tx.rollback().await;
            return Err(e.into());
        }
        self.commit_with_person(tx, &member).await?;
        info!(team = team.id, member = %member.id, members = team.member_count, "Added team member");

        self.notifier
            .notify(
                &captain,
                &format!("{} joined your team {}", member.name, team.name),
            )
            .await;
        self.notifier
            .notify(
                &member,
                &format!("{} added you to team {}", captain.name, team.name),
            )
            .await;
        Ok(team)
    }

    /// Submit the captain's team for the event.
    pub async fn submit_team(&self, captain_id: &str) -> EngineResult<Team> {
        let captain = self.person(captain_id).await?;
        if !captain.is_captain() {
            return Err(EngineError::Conflict(format!(
                "person {} is not a team captain",
                captain.id
            )));
        }
        let mut team = self.team_of(&captain).await?;
        if team.status != TeamStatus::Pending {
            return Err(EngineError::Conflict(format!(
                "team {} is {} and can no longer be submitted",
                team.id, team.status
            )));
        }
        if team.member_count > self.config.max_team_size {
            return Err(EngineError::Conflict(format!(
                "team {} exceeds {} members",
                team.id, self.config.max_team_size
            )));
        }

        team.submitted = true;
        team.updated_at = Utc::now();
        self.store.save_team(&team).await?;
        info!(team = team.id, members = team.member_count, "Submitted team");
        Ok(team)
    }

    /// Flag a team as lost, or clear the flag once it is found.
    pub async fn set_team_lost(&self, team_id: TeamId, lost: bool) -> EngineResult<Team> {
        let mut team = self.team(team_id).await?;
        if team.is_lost != lost {
            team.is_lost = lost;
            self.store.save_team(&team).await?;
            if lost {
                warn!(team = team.id, location = team.location(), "Team reported lost");
            } else {
                info!(team = team.id, "Team found");
            }
        }
        Ok(team)
    }

    async fn ensure_identity_free(
        &self,
        owner: Option<&str>,
        student_id: &str,
        identity: &str,
        tel: &str,
    ) -> EngineResult<()> {
        let clash = self
            .store
            .find_identity_conflicts(student_id, identity, tel)
            .await?
            .into_iter()
            .find(|p| Some(p.id.as_str()) != owner);
        match clash {
            Some(other) => Err(EngineError::Conflict(format!(
                "identity fields already registered by {}",
                other.id
            ))),
            None => Ok(()),
        }
    }
}
