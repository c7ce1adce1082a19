// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between a worker's client proxy and the run-state server.
//!
//! Wire format: 4-byte length prefix (big-endian) + MessagePack payload.
//! Artifact metadata the core treats opaquely round-trips as MessagePack
//! ext type 0; see [`ext`].

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod framing;
pub mod ext;
mod request;
mod response;

pub use ext::{Opaque, OPAQUE_EXT_TYPE};
pub use framing::{decode, encode, read_framed, read_message, write_framed, write_message, ProtocolError, MAX_MESSAGE_BYTES};
pub use request::{CacheKey, Request};
pub use response::{MemoLookup, NameReservation, Response, WireError};
