// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque extension-type escape hatch.
//!
//! `pipedag_core::MaterializedValue::Opaque` carries bytes the run
//! coordination core never interprets (table/blob metadata the store
//! produced). On the wire these round-trip as MessagePack ext type 0,
//! mirroring how the original implementation used `msgpack.ExtType(0,
//! pickle.dumps(obj))` as its "anything else" fallback — we use a plain
//! byte string instead of a language-specific pickle.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reserved ext type code for opaque payloads.
pub const OPAQUE_EXT_TYPE: i8 = 0;

/// A byte string that serializes as MessagePack ext type 0 rather than a
/// plain bin/str, so decoders can distinguish "opaque blob" from
/// "ordinary bytes" without a side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque(pub Vec<u8>);

impl Serialize for Opaque {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = rmpv::Value::Ext(OPAQUE_EXT_TYPE, self.0.clone());
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value)
            .map_err(|e| S::Error::custom(e.to_string()))?;
        serializer.serialize_bytes(&buf)
    }
}

impl<'de> Deserialize<'de> for Opaque {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let value = rmpv::decode::read_value(&mut bytes.as_slice())
            .map_err(|e| D::Error::custom(e.to_string()))?;
        match value {
            rmpv::Value::Ext(OPAQUE_EXT_TYPE, data) => Ok(Opaque(data)),
            other => Err(D::Error::custom(format!("expected opaque ext value, found {other:?}"))),
        }
    }
}
