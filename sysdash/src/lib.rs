//! Real-time telemetry distribution and threshold alerting.
//!
//! One upstream WebSocket feed is decoded into [`types::Snapshot`]s and fanned out by a
//! [`channel::Hub`] to independent views, each keeping its own bounded history, rate
//! baselines and alert evaluators.

pub mod channel;
pub mod decode;
pub mod error;
pub mod history;
pub mod rate;
pub mod session;
pub mod threshold;
pub mod types;
pub mod views;
pub mod ws;
