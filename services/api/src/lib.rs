//! services/api/src/lib.rs
//!
//! The adaptive quiz service: storage and generator adapters, the question
//! supply pipeline and the HTTP layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod supply;
pub mod web;
