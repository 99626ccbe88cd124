//! # Aegis Core
//!
//! The domain layer of the Aegis gateway.
//! Domain types and the port traits that infrastructure implements; no I/O lives here.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::RepoError;
