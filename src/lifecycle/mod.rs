// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Operation type, status transitions and error codes shared by the
//! finalizer-gated controllers.

pub mod error_codes;
pub mod operation;
pub mod status;

pub use error_codes::{determine_error_codes, last_error_from};
pub use operation::compute_operation_type;
pub use status::{mark_error, mark_started, mark_succeeded, LifecycleStatus};
