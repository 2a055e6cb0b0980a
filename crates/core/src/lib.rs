//! Complaint lifecycle workflow for campusdesk.
//!
//! The orchestrator gates every request through [`AccessPolicy`], applies the
//! workflow or verification engine, persists the complaint and publishes a
//! [`WorkflowEvent`]. Audit and notification work happens in subscribers.

pub mod services;

pub mod testing;

pub use services::*;
