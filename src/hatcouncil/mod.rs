// src/hatcouncil/mod.rs

pub mod clients;
pub mod completion;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod lens;
pub mod member;
pub mod moderator;
pub mod phase;
pub mod prompts;
pub mod retry;
pub mod search;
pub mod session;
pub mod transcript;

