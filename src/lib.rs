//! passfilt: policy filtering and probability redistribution for password distributions
//!
//! A distribution of passwords is run through an accept/reject oracle. The
//! probability mass of the rows that were filtered out is then handed back to
//! the survivors (or to synthetic rows) under a named redistribution law, so
//! the result is still a usable distribution.
//!
//! # Architecture
//!
//! ## Distribution ([`distribution`])
//! - [`distribution::Distribution`]: probability-sorted rows with passthrough columns
//! - [`distribution::csv`]: header-driven CSV reading and writing
//!
//! ## Oracles ([`oracle`])
//! - [`oracle::session`]: one external oracle process and its line protocol
//! - [`oracle::client`]: relaunch-on-death client over sessions
//! - [`oracle::retry`]: launch attempt budget and escalating grace period
//! - [`oracle::local`]: in-process character-class composition policy
//!
//! ## Filter Stage ([`filter`])
//! - Accept/reject classification and surplus accounting
//!
//! ## Redistribution ([`redistribution`])
//! - [`redistribution::laws`]: none, proportional, uniform, convergent, extraneous
//! - [`redistribution::registry`]: name and alias resolution, custom laws
//!
//! ## Pipeline ([`pipeline`])
//! - Filter, redistribute, and report a run
//!
//! ## Analysis ([`guess`])
//! - Optimal guessing curve of a distribution
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: run settings and the error type
//! - [`config::loader`]: JSON loading
//! - [`config::validator`]: startup validation
//!
//! # Protocol
//!
//! An external oracle is started as `<executable> <policy> <batch_size>`. For
//! each query the client writes one password followed by `\n` and reads one
//! line back; `true` (any case) accepts, anything else rejects. The process may
//! exit after answering `batch_size` queries; the client relaunches it.

pub mod cli;
pub mod config;
pub mod distribution;
pub mod filter;
pub mod guess;
pub mod oracle;
pub mod pipeline;
pub mod redistribution;

pub use config::types::*;
