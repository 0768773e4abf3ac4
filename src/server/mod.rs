//! HTTP server for Loan Desk

pub mod http;

pub use http::{dispatch, run, AppState};
