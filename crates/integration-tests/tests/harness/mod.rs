#![allow(dead_code)]

pub mod config;
pub mod engine;
pub mod mock_upstream;
pub mod server;
