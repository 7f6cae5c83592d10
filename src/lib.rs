//! Slicevault Library
//!
//! Chunked-upload assembly and content-addressed deduplication over a
//! local content store. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `storage`: Write-once content store and existence checks
//! - `upload`: Slice staging, merging, hashing and the upload service
//! - `routes`: HTTP endpoints over the upload service

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;

pub use error::{Result, UploadError};
