//! Real-time client hub
//!
//! Keeps the set of connected channels, fans status pushes out to all of
//! them, and answers the small request protocol spoken on each channel.

mod broadcast;
mod keepalive;
mod messages;
mod session;

pub use broadcast::{BroadcastHub, BroadcastReport, ClientConnection, ClientId, DeliveryFailure, HubError};
pub use keepalive::{KeepAlive, KeepAliveAction};
pub use messages::{ChannelReply, Envelope, InboundMessage, OutboundMessage};
pub use session::ChannelSession;
