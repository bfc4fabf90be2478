//! plangate - contact API authorized by policy decision plans
//!
//! The `authz` module turns a PDP plan into a SQL filter; the rest is the
//! contact service built on top of it. All modules are public for testing.

pub mod authz;
pub mod contacts;
pub mod entities;
pub mod errors;
pub mod seed;
pub mod settings;
pub mod storage;
pub mod web;
