//! Wire protocol
//!
//! Packets are framed by a fixed 9-byte header (one type byte plus the body
//! length as a big-endian u64) followed by the body. The nine packet types
//! and their bodies live in [`request`]; [`router`] reads whole packets off
//! a connection and enforces the caller's expected-type set.

pub mod packet;
pub mod request;
pub mod router;

pub use packet::{Header, PacketType, HEADER_LEN};
pub use request::{AuthBody, FileBody, MetaAction, MetaBody, ReplyBody, Request, SyncBody};
pub use router::{expect_ack, route_conn, wait};

// vim: ts=4
