// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

/// HiveMind Rust SDK
///
/// Submit tasks to a HiveMind node and poll their results.

pub mod client;
pub mod types;

pub use client::HiveMindClient;
pub use types::*;
