// src/storefront/mod.rs

pub mod agent_invoker;
pub mod chat;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod janitor;
pub mod orchestrator;
pub mod poll;
pub mod request_id;
pub mod result_cache;
#[cfg(feature = "server")]
pub mod server;
