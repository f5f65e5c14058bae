pub mod app_state;
pub mod config;
pub mod error;
pub mod extract;
pub mod handler;
pub mod model;
pub mod observability;
pub mod query;
pub mod relay;
pub mod response;
pub mod server;
pub mod startup;
pub mod store;
pub mod upload;

pub use http_body_util;
pub use hyper;
pub use hyper_util;
pub use std::sync::Arc;
pub use tokio;
