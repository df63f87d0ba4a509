//! Chat relay — Telegram in, generative model out, every turn logged.

pub mod channels;
pub mod config;
pub mod error;
pub mod intake;
pub mod llm;
pub mod relay;
pub mod sessions;
pub mod store;
pub mod web;
