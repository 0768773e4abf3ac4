//! Loan Desk - loan application intake and review service
//!
//! Applicants submit loan applications and register supporting documents;
//! staff review them through an admin API backed by MongoDB.
//!
//! ## Components
//!
//! - **Store**: one record per application, with a unique reference number
//! - **Lifecycle**: status changes with an append-only timeline and notes
//! - **References**: human-readable `SBM-YYYY-MMDD-RRRR` identifiers
//! - **Documents**: per-slot metadata with independent verification status

pub mod config;
pub mod db;
pub mod lifecycle;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use lifecycle::LoanService;
pub use server::{run, AppState};
pub use types::{LoanDeskError, Result};
