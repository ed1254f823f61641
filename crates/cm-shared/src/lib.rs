//! Shared types and error taxonomy for the container manager daemon.
//!
//! Mirrors the teacher crate's `boxlite_shared` split: a crate-wide error
//! enum plus small value types used at every layer boundary so components
//! don't need to depend on each other just to pass an ID around.

pub mod errors;
pub mod ids;
pub mod log;

pub use errors::{CmError, CmResult};
pub use ids::{GuestIndex, RoleName};
