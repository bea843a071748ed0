//! chorus-gateway - HTTP surface for the chorus relay
//!
//! Exposes chat fan-out, single-provider continuation, session reset and
//! history listing as JSON endpoints over a shared [`chorus_core::Relay`],
//! plus a browser page at `/` that shows the three providers side by side.

pub mod error;
pub mod protocol;
pub mod server;
pub mod webchat;

pub use error::ApiError;
pub use server::{GatewayServer, GatewayState};
