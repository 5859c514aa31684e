//! walktrack-core - progress tracking for a multi-route walking event.
//!
//! This crate holds everything except delivery: the checkpoint topology of
//! each route, the person and team models, the progress engine that turns
//! checkpoint scans into walk and team statuses, the cache-aside layer in
//! front of the store of record, and the timeout scanner used by route
//! marshals. Storage, cache and notification backends are injected through
//! traits; in-memory implementations of each ship with the crate.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod scanner;
pub mod store;
pub mod topology;

pub use cache::{KeyValueCache, MemoryCache};
pub use config::EngineConfig;
pub use engine::{
    CheckIn, CheckInIntent, CheckInOutcome, CohortSummary, ProfileUpdate, ProgressEngine,
    RecomputePolicy, Registration, SnapshotRecompute,
};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use models::{Person, PersonType, Team, TeamId, TeamStatus, WalkStatus};
pub use notify::{LogNotifier, Notifier};
pub use scanner::{GroupKind, PointGroup, RosterEntry, TimeoutScanner};
pub use store::{MemoryStore, StoreError, WalkStore};
pub use topology::{Route, NOT_ARRIVED, NOT_DEPARTED, UNKNOWN_POINT};
