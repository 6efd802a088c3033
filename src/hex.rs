// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bytes <-> hex-string conversions for logging and id parsing.
//!
//! Thin wrappers over the `hex` crate so call sites match the original
//! client's `HexUtils`/`sgs_id_init_from_hex` pairing of a raw id type with a
//! hex-string convenience view.

use crate::error::{Error, Result};

/// Render `bytes` as a lowercase hex string.
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parse a hex string into bytes. Accepts both upper and lower case.
pub fn decode(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid hex string")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let bytes = [0x00, 0x7a, 0xff];
        let s = encode(&bytes);
        assert_eq!(s, "007aff");
        assert_eq!(decode(&s).unwrap(), bytes);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(decode("zz").is_err());
    }
}
