//! HTTP implementations of the council's external services.
//!
//! Both clients share pooled connections through [`http_pool`].

pub mod http_pool;
pub mod openrouter;
pub mod tavily;
