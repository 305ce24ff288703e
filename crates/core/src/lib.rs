//! Hark Core - domain model and configuration
//!
//! Shared foundation for the Hark voice assistant:
//! - **Domain** (`domain`) - Session, Turn, PendingAction, Intent
//! - **Config** (`config`) - TOML + env configuration with secret handling
//! - **Errors** (`errors`) - domain invariant violations
//!
//! # Key Types
//!
//! - `Intent` - closed classification of one user utterance
//! - `PendingAction` - a proposed send awaiting explicit confirmation
//! - `AppConfig` - validated runtime configuration
//!
//! This crate is deliberately free of I/O; gateways to Slack, the language
//! model, the datastore, and the voice providers live in sibling crates.

pub mod config;
pub mod domain;
pub mod errors;
