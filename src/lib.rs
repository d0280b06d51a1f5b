//! inventory-sync - A multi-region cloud inventory sync engine
//!
//! This crate collects resource inventories from every region of a cloud
//! account in parallel, answers repeated requests from a short-lived
//! freshness cache, persists each collection to SQLite, and falls back to
//! the persisted snapshot when the provider cannot be reached.

pub mod analysis;
pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod models;
pub mod otel;
pub mod provider;
pub mod store;
pub mod sync;
