// src/lib.rs

//! newsdesk: collects broadcaster news, publishes it and notifies channels.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
