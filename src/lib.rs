//! spamcheck — concurrent spam report over a stream of user addresses.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
