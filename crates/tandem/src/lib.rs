//! Tandem - coordination for agents sharing a workspace
//!
//! Command-line front end over `tandem-core`: projects, agents and their
//! contexts, file locks, and project memory. Every command prints JSON.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod cli;
