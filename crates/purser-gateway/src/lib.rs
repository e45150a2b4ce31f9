// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Purser support bridge.
//!
//! Serves the payment notification endpoint and the operator health
//! surface. Business logic lives in `purser-payments`; this crate maps
//! HTTP to the processor and back.

pub mod handlers;
pub mod server;

pub use server::{start_server, GatewayState, ServerConfig};
