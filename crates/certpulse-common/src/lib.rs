//! Shared domain types for the certpulse workspace.
//!
//! Everything here is plain data: tracking records, the closed [`types::Status`]
//! enumeration and the owner's notification preferences. Classification of a
//! certificate's expiry into a status lives in [`types::Status::for_expiry`] so
//! that every component derives status the same way.

pub mod types;
