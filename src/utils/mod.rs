pub mod config;
pub mod error;
pub mod hex;
pub mod retry;
