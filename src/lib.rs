//! Chat proxy between a browser client and hosted LLM providers.
//!
//! A request flows through validation ([`request`]), payload construction
//! ([`payload`]), provider selection and ordered model fallback
//! ([`provider`], [`dispatcher`]) and finally back to the client as either a
//! byte stream or a single JSON document ([`relay`]).

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod model_catalog;
pub mod payload;
pub mod provider;
pub mod proxy;
pub mod relay;
pub mod request;
