// Copyright (c) 2022-2023 The MobileCoin Foundation

use sha2::{Digest, Sha256};

/// Abort on a detected invariant violation (memory corruption or hardware fault).
///
/// This is not an error path, callers must not be able to recover from it.
#[track_caller]
pub fn abort(msg: &str) -> ! {
    #[cfg(feature = "log")]
    log::error!("abort: {}", msg);

    panic!("abort: {}", msg)
}

/// BIP-340 style tagged hash, `SHA256(SHA256(tag) || SHA256(tag) || data...)`
pub fn tagged_hash(tag: &[u8], data: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag);

    let mut h = Sha256::new();
    h.update(tag_hash);
    h.update(tag_hash);
    for d in data {
        h.update(d);
    }

    h.finalize().into()
}
