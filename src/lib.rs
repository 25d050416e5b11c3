//! Favicon fingerprinting and scan-export triage for OSINT pivoting.

pub mod error;
pub mod fetcher;
pub mod fingerprint;
pub mod observability;
pub mod query;
pub mod report;
pub mod triage;

pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, Source, favicon_hash};
