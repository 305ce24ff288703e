//! Agent Runtime - intent parsing and command orchestration
//!
//! The "brain" of Hark: one transcribed utterance at a time is driven
//! through classification, the confirmation handshake, and Slack dispatch:
//! 1. **Intent Parsing** (`parser`) - utterance + history + pending action
//!    into a closed `Intent` plus a conversational reply
//! 2. **Orchestration** (`orchestrator`) - the Idle/AwaitingConfirmation
//!    state machine, turn logging, and spoken-error containment
//! 3. **Action Handlers** (`handlers`) - confirmed or immediate intents
//!    translated into `SlackGateway` calls and result strings
//!
//! # Safety Principle
//!
//! The language model is strictly a classifier. It never triggers a Slack
//! side effect by itself: sends go through an explicit spoken confirmation,
//! and anything unparseable degrades to plain conversation.

pub mod handlers;
pub mod llm;
pub mod orchestrator;
pub mod parser;
