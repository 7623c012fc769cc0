pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logs;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod worker;
