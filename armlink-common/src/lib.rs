//! armlink-common/src/lib.rs
//!
//! Shared models, the workspace error type and the collaborator traits
//! used by the teleoperation runtime.

pub mod error;
pub mod models;
pub mod traits;

pub use error::Error;
