pub mod config;
pub mod conversation;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod stream;
pub mod transport;
