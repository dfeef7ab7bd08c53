//! Marketplace Payments
//!
//! Payment splitting, commission calculation, refunds and vendor settlement for a
//! multi-vendor marketplace.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod migrator;
pub mod models;
pub mod services;

pub use errors::ServiceError;
