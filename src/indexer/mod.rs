// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexer module - embedding and store maintenance commands

pub mod index;
pub mod remove;
