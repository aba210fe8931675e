//! Messaging channel: inbound events from the webhook, outbound replies to the platform.
//!
//! The dispatcher only sees [`InboundEvent`] and [`ReplySender`]; the LINE module
//! owns the wire formats on both sides.

mod inbound;
pub mod line;
mod outbound;

pub use inbound::{InboundEvent, UNKNOWN_SENDER};
pub use line::LineChannel;
pub use outbound::{ChannelError, Reply, ReplySender};
