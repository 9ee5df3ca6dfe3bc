//! Durable per-repository state: the `.switchboard/` directory.

pub mod handoff;
pub mod model;
pub mod store;

pub use model::{ActiveRun, Cooldown, ErrorClass, Provider, ProviderState, RepoState,
    SwitchDecision, SwitchMeta, TranscriptRecord};
