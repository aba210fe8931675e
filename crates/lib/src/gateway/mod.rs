//! Gateway: HTTP webhook endpoint for the messaging platform.
//!
//! Single port serves a health check and the webhook route. Each webhook POST is verified,
//! handled to completion (one reply per text event), then acknowledged.

mod server;

pub use server::{build_bot, router, run_gateway, GatewayState};
