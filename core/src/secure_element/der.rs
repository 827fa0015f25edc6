// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Minimal DER helpers for secure element responses
//!
//! Co-processor chips return public keys as a DER `BIT STRING` and ECDSA
//! signatures as two bare DER `INTEGER`s (no enclosing `SEQUENCE`), these are
//! reduced here to fixed-width raw components.

/// DER `BIT STRING` header for an uncompressed P-256 point
const PUBKEY_PREFIX: [u8; 4] = [0x03, 0x42, 0x00, 0x04];

/// DER `INTEGER` tag
const INTEGER: u8 = 0x02;

/// Parse a DER `BIT STRING` encoded uncompressed public key to raw `X || Y`
pub fn parse_pubkey(der: &[u8]) -> Option<[u8; 64]> {
    if der.len() != PUBKEY_PREFIX.len() + 64 || der[..4] != PUBKEY_PREFIX {
        return None;
    }

    let mut raw = [0u8; 64];
    raw.copy_from_slice(&der[4..]);
    Some(raw)
}

/// Parse a signature encoded as two consecutive DER `INTEGER`s to raw `R || S`
pub fn parse_signature(der: &[u8]) -> Option<[u8; 64]> {
    let mut raw = [0u8; 64];

    let (r, rest) = parse_integer(der)?;
    let (s, rest) = parse_integer(rest)?;
    if !rest.is_empty() {
        return None;
    }

    raw[32 - r.len()..32].copy_from_slice(r);
    raw[64 - s.len()..].copy_from_slice(s);

    Some(raw)
}

/// Parse a single non-negative `INTEGER` of up to 32 bytes (excluding sign
/// padding), returning the value and the remaining buffer
fn parse_integer(buff: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&tag, buff) = buff.split_first()?;
    let (&len, buff) = buff.split_first()?;
    let len = len as usize;

    // Short form lengths only, a 33 byte integer never needs more
    if tag != INTEGER || len == 0 || len > 33 || buff.len() < len {
        return None;
    }

    let (mut value, rest) = buff.split_at(len);

    // Negative values are not valid signature components
    if value[0] & 0x80 != 0 {
        return None;
    }

    // Strip sign padding
    if value.len() > 1 && value[0] == 0x00 {
        if value[1] & 0x80 == 0 {
            return None;
        }
        value = &value[1..];
    }

    if value.len() > 32 {
        return None;
    }

    Some((value, rest))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pubkey() {
        let mut der = [0u8; 68];
        der[..4].copy_from_slice(&PUBKEY_PREFIX);
        der[4..].iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);

        let raw = parse_pubkey(&der).unwrap();
        assert_eq!(&raw[..], &der[4..]);

        der[3] = 0x02;
        assert_eq!(parse_pubkey(&der), None);
        assert_eq!(parse_pubkey(&der[..67]), None);
    }

    #[test]
    fn signature_padded_and_short() {
        // R with sign padding (33 bytes), S short (31 bytes)
        let mut der = vec![INTEGER, 33, 0x00];
        der.extend_from_slice(&[0x81; 32]);
        der.extend_from_slice(&[INTEGER, 31]);
        der.extend_from_slice(&[0x11; 31]);

        let raw = parse_signature(&der).unwrap();

        assert_eq!(&raw[..32], &[0x81; 32]);
        assert_eq!(raw[32], 0x00);
        assert_eq!(&raw[33..], &[0x11; 31]);
    }

    #[test]
    fn signature_rejects_malformed() {
        let mut der = vec![INTEGER, 32];
        der.extend_from_slice(&[0x11; 32]);
        der.extend_from_slice(&[INTEGER, 32]);
        der.extend_from_slice(&[0x22; 32]);
        assert!(parse_signature(&der).is_some());

        // Trailing data
        let mut trailing = der.clone();
        trailing.push(0x00);
        assert_eq!(parse_signature(&trailing), None);

        // Truncated
        assert_eq!(parse_signature(&der[..der.len() - 1]), None);

        // Wrong tag
        let mut tag = der.clone();
        tag[0] = 0x30;
        assert_eq!(parse_signature(&tag), None);

        // Negative
        let mut neg = der.clone();
        neg[2] = 0x80;
        assert_eq!(parse_signature(&neg), None);

        // Unnecessary padding
        let mut pad = vec![INTEGER, 2, 0x00, 0x01];
        pad.extend_from_slice(&der[34..]);
        assert_eq!(parse_signature(&pad), None);
    }
}
