//! Status fan-out to live push connections
//!
//! Updates are published on a broker channel shared by every server process.
//! Each process runs one [`FanoutSubscriber`] that forwards messages to the
//! connections it holds in its [`ConnectionRegistry`].

pub mod broadcaster;
pub mod fanout;
pub mod liveness;
pub mod ports;
pub mod registry;

pub use broadcaster::StatusBroadcaster;
pub use fanout::FanoutSubscriber;
pub use liveness::{parse_client_message, run_ping_loop, ClientMessage};
pub use registry::{ConnectionId, ConnectionRegistry, ConnectionSender};
