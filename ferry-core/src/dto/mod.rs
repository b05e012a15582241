//! Data Transfer Objects
//!
//! Inputs used to create jobs and read-only projections served by the
//! status surface and written into status reports.

pub mod job;
pub mod status;
