//! Ferry exporter
//!
//! Periodically exports hosted data-science projects: their files into an
//! object store and their compute environment as a container image, keeping
//! a per-project sync log and a service-wide status summary.

pub mod api;
pub mod cipher;
pub mod config;
pub mod db;
pub mod integrations;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod tasks;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;
