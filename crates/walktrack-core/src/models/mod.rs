//! Data models for event participants and teams.
//!
//! - `Person`: a registered walker with team membership and walk status
//! - `Team`: route, checkpoint position and aggregate status
//!
//! Status and type fields are closed enums; numeric codes only exist at the
//! edges (see [`crate::topology::Route::code`]).

pub mod person;
pub mod team;

/// Store-assigned team identifier.
pub type TeamId = u64;

pub use person::{Campus, Contact, Gender, Person, PersonType, Role, WalkStatus};
pub use team::{Team, TeamDraft, TeamStatus};
