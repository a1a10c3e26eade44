//! Data models for tiku-ingest

pub mod field;
pub mod run_session;
pub mod work_item;

pub use field::ExtractionField;
pub use run_session::{
    GroupCompletion, RunReport, RunSession, RunState, StateTransition, StopReason,
};
pub use work_item::{Catalog, GroupSpec, WorkItem};
