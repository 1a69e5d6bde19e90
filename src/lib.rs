pub mod config;
pub mod constants;
pub mod error;
pub mod log;
pub mod service;
pub mod utility;
