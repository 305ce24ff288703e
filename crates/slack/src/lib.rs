//! Slack Integration - typed Web API gateway
//!
//! This crate is Hark's only door to Slack:
//! - **Gateway** (`gateway`) - the `SlackGateway` trait the orchestrator's
//!   action handlers call, plus the `SlackApiError` taxonomy they branch on
//! - **Client** (`api`) - reqwest-based Web API client with bounded
//!   exponential backoff for rate limits
//!
//! Rate-limit retries are fully encapsulated here; callers only observe
//! eventual success or eventual failure.

pub mod api;
pub mod gateway;

pub use api::SlackApiClient;
pub use gateway::{
    ChannelRef, DirectChannel, DmUser, MentionScope, SlackApiError, SlackGateway, SlackMessage,
};
