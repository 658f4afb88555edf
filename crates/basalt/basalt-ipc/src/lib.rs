//! `basalt-ipc`: duplex inter-process byte channel over one mapped file.
//!
//! Exactly two processes attach to the same backing file and exchange
//! variable-length byte messages, full duplex, without locks. The file holds
//! two single-producer/single-consumer byte rings; each endpoint produces
//! into its own ring and consumes the peer's, so the directions never
//! contend:
//!
//! ```text
//! ┌─────────────┐        shared channel file        ┌─────────────┐
//! │ Endpoint A  │  ── ring A (A writes, B reads) ─▶ │ Endpoint B  │
//! │ (Process 1) │  ◀─ ring B (B writes, A reads) ── │ (Process 2) │
//! └─────────────┘                                   └─────────────┘
//! ```
//!
//! Roles are negotiated through the file header: the first attacher claims
//! A, the second claims B, a third fails. Messages are framed as a 4-byte
//! little-endian length followed by the payload; a frame may wrap around the
//! ring end, prefix included. Per direction, messages arrive in the exact
//! order they were sent.
//!
//! Send and recv are non-blocking by default (`Ok(0)` / `Ok(None)` when the
//! ring is full / empty) and poll the ring every 100 ms in blocking mode,
//! with an optional deadline.
//!
//! # Example
//!
//! ```ignore
//! use basalt_ipc::{Endpoint, RingConfig};
//!
//! // Process 1
//! let mut a = Endpoint::open("/tmp/basalt_duplex", RingConfig::default())?;
//! a.send(b"ping", true, None)?;
//!
//! // Process 2
//! let mut b = Endpoint::open("/tmp/basalt_duplex", RingConfig::default())?;
//! if let Some(message) = b.recv(true, None)? {
//!     println!("got {} bytes", message.len());
//! }
//! ```
//!
//! # Internal modules
//!
//! - `layout`: on-file binary layout (public, for tooling and tests)
//! - `ring`: SPSC byte ring with wrap-around copies and cursor publishing
//! - `frame`: length-prefixed framing over the ring
//! - `endpoint`: role negotiation, blocking operations, teardown
//! - `error`: the error taxonomy

mod endpoint;
mod error;
mod frame;
pub mod layout;
mod ring;

pub use endpoint::{Endpoint, Role};
pub use error::{Error, Result};
pub use ring::{DEFAULT_PAYLOAD_SIZE, RingConfig};
