#![doc = "wikibridge-core: core logic library for wikibridge."]

//! This crate contains the data models, the markup rewriting pipeline and the
//! batch synchronisation engine used to move wiki content between stores.
//! It has no CLI concerns; the `wikibridge` binary crate wires these pieces to
//! real HTTP clients and command-line flags.
//!
//! # Usage
//! Add this as a dependency for anything that needs to convert source markup,
//! rebuild page hierarchies or drive a migration run against a pair of stores.

pub mod attachments;
pub mod config;
pub mod confluence;
pub mod contract;
pub mod docx;
pub mod error;
pub mod github;
pub mod memory;
pub mod naming;
pub mod report;
pub mod rewrite;
pub mod synchronise;
pub mod tree;
