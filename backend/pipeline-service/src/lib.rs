//! Cache-backed feed and messaging pipeline.
//!
//! Read paths go through cache managers that degrade to the store on
//! any cache failure. Write paths validate synchronously, enqueue a
//! typed job, and let one of five queue workers land the write and its
//! side effects (invalidation, notifications, broadcasts).

pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;
pub mod workers;
