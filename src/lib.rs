//! promoter - a release promotion controller
//!
//! Builds are registered from CI events, gate outcomes are reported as
//! they arrive, and each build is finalized exactly once as deploy, hold
//! or reject. Finalized decisions are dispatched once to a deployment
//! executor and always announced to a notification sink.

pub mod cli;
pub mod config;
pub mod http_server;
pub mod observability;
pub mod promotion;
