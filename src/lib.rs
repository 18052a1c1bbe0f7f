// src/lib.rs

//! Bounded-concurrency, depth-limited web scanner library.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod utils;
