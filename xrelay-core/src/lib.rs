#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod events;
pub mod framework;
pub mod processors;
pub mod sources;
pub mod stats;
pub mod utils;
