//! CLI command implementations for zrecsync.
//!
//! Each module corresponds to a specific command available to users.

pub mod doctor;
pub mod scan;
pub mod sync;
