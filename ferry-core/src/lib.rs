//! Ferry Core
//!
//! Core types for the Ferry project exporter.
//!
//! This crate contains:
//! - Domain types: jobs, executions, run links, the status taxonomy and the
//!   `taskState` idempotency document
//! - DTOs: job creation requests and status projections
//!
//! Note: persistence and execution live in `ferry-exporter`.

pub mod domain;
pub mod dto;
