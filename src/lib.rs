mod macros;

pub mod chat;
pub mod cli;
pub mod error;
pub mod handler;
pub mod integrations;
pub mod metadata;
pub mod pollers;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod stores;
pub mod types;
