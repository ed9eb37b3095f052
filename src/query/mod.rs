// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query module - search and store inspection commands

pub mod search;
pub mod stats;
