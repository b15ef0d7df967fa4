// File: src/connection/mod.rs
//
// The persistent command channel to the arm.

pub mod manager;
mod session;

pub use manager::{ConnectionEvents, ConnectionManager};
