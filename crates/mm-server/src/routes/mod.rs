//! Route handlers for the HTTP API.

pub mod files;
pub mod health;
pub mod process;
pub mod tools;
