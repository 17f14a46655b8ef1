//! HTTP surface: admission middleware and the service router.

mod middleware;
mod server;

pub use middleware::{admission_middleware, client_key, protect, SharedAdmission, FORWARDED_FOR};
pub use server::{router, HttpServer};
