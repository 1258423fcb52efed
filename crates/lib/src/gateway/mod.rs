//! Gateway: HTTP endpoint the messaging platform posts activities to.
//!
//! Conversation updates are queued and handed to the dispatcher one task per event;
//! the HTTP response does not wait for delivery.

mod server;

pub use server::{build_dispatcher, run_gateway, serve};
