//! HTTP front end for the dispatcher.
//!
//! Any request to `/{name}` runs the limiter registered under `name` and
//! answers 200 when admitted or 429 when rejected.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, LimiterInfo};
