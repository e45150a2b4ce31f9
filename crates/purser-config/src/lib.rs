// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Purser support bridge.
//!
//! Loaded from TOML files following the XDG hierarchy with `PURSER_*`
//! environment variable overrides. All sections default to sensible
//! values; `serve` additionally requires the Telegram and Stripe
//! credentials (see [`model::PurserConfig::validate_for_serve`]).

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::PurserConfig;
