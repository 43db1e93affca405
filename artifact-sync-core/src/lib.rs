#![doc = "artifact-sync-core: core logic library for artifact-sync."]

//! This crate holds the data model, key mapping, existence-gated transfers,
//! directory mirroring, manifest recording and the push/pull runs.
//! Concrete cloud clients are not included here; they implement
//! [`contract::ObjectStore`] in the CLI crate.
//!
//! # Usage
//! Build a [`config::SyncConfig`], pick an [`contract::ObjectStore`] and call
//! [`synchronise::push`] or [`synchronise::pull`].

pub mod config;
pub mod contract;
pub mod error;
pub mod gate;
pub mod local_store;
pub mod manifest;
pub mod resolve;
pub mod retry;
pub mod synchronise;
pub mod transfer;
