//! HTTP handlers: thin adapters from axum requests to the core flows.

pub(crate) mod admin;
pub(crate) mod auth;
pub(crate) mod health;
pub(crate) mod me;
pub(crate) mod root;
