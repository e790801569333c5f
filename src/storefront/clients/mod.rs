//! Completion-service clients.
//!
//! Each submodule offers a concrete client that speaks a particular API while
//! conforming to the uniform [`ClientWrapper`](crate::client_wrapper::ClientWrapper) contract.

pub mod common;

pub mod assistants;
pub mod openai;
