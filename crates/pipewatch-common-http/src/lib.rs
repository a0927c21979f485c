// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for pipewatch.
//!
//! This crate provides:
//! - A pre-configured HTTP client builder with a consistent User-Agent header
//! - Classification of failures into transient (worth trying again on the next
//!   sync pass) and permanent

mod client;
mod transient;

pub use client::{builder, new_client_with_timeout, user_agent};
pub use transient::{is_transient_status, TransientError};
