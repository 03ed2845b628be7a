//! Witness - worker supervision for a multi-agent town
//!
//! Classifies and parses worker mail, triages help requests, guards bead
//! respawns with a persistent circuit breaker, and hands out worker names.

pub mod commands;
pub mod config;
pub mod dedup;
pub mod error;
pub mod lockfile;
pub mod namepool;
pub mod protocol;
pub mod respawn;
pub mod telemetry;
pub mod witness;
pub mod workspace;
