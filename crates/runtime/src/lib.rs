//! Connection lifecycle for the RMS assistant backend socket.
//!
//! This crate owns the single logical connection to the backend agent:
//!
//! * [`Transport`] runs the connect / read / write loop over a websocket and
//!   reconnects according to a [`ReconnectPolicy`](rms_protocol::ReconnectPolicy)
//! * [`ConnectionHandle`] is the cheap, cloneable sending side; sends are
//!   best-effort and fail with [`Error::NotConnected`] while the socket is down
//! * [`OutboundSink`] is the seam the session layer sends through, so it can be
//!   driven by a [`MemorySink`] in tests
//!
//! Inbound frames are decoded by [`codec`] and published as
//! [`TransportEvent`]s. A malformed frame is logged and dropped; it never takes
//! the connection down.

pub mod codec;
pub mod connection;
pub mod error;
pub mod transport;

pub use connection::{ConnectionHandle, MemorySink, OutboundSink};
pub use error::{Error, Result};
pub use transport::{DEFAULT_ENDPOINT, Transport, TransportConfig, TransportEvent};
