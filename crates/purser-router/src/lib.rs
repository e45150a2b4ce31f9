// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing engine for the Purser support bridge.
//!
//! Decides direction for each inbound message and resolves the
//! counterpart: user messages are forwarded into their dedicated
//! workspace thread (created lazily on first contact), admin replies are
//! resolved back to a user through two-stage resolution.

pub mod engine;

pub use engine::{
    AdminRouteOutcome, InboundAdminMessage, InboundUserMessage, RoutingEngine, UserRouteOutcome,
};
