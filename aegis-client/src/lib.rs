//! AEGIS client library
//!
//! The client-side synchronization core of the AEGIS case-management
//! client, exposed as a library for the headless watcher and for testing.

pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod platform;
pub mod services;
pub mod storage;
