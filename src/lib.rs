//! sharelink-client - Client-side transfer orchestration for the ShareLink
//! file sharing service
//!
//! This crate drives the client half of the ShareLink contract:
//! - Batch upload of up to 5 files / 30 MiB with streamed progress
//! - Short link + scannable-code derivation from the upload result
//! - Bearer-token session lifecycle (decode-only, self-healing expiry)
//! - Short-code resolution and the password-gated download exchange
//!
//! The backend (storage, link bookkeeping, credential issuance) is an
//! external collaborator; this crate only speaks its HTTP contract.

pub mod batch;
pub mod client;
pub mod config;
pub mod download;
pub mod resolve;
pub mod session;
pub mod upload;
