//! Tollgate - In-Process Admission Control
//!
//! This crate implements a fixed window rate limiter for HTTP services.
//! Each client, identified by its forwarded or peer address, may issue a
//! bounded number of requests per window; the rest are answered with
//! `429 Too Many Requests` before reaching the protected handler.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
