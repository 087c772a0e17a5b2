//! Maintenance toolkit for Etherpad instances.
//!
//! - [`purge`]: retention-based deletion of pads, grouped by name suffix
//! - [`etherpad`]: typed client for the Etherpad HTTP API
//! - [`routes`]: Prometheus endpoint exposing pad counts per suffix
//! - [`config`] and [`observability`]: the configuration file and logging

pub mod config;
pub mod etherpad;
pub mod observability;
pub mod purge;
#[cfg(feature = "prometheus")]
pub mod routes;

#[cfg(test)]
mod tests;
