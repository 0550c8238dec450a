//! Framed records on top of SPSC byte rings.
//!
//! Each record is a fixed header of little-endian `u32` words followed by
//! a body. A record is only written when it fits entirely, and only
//! consumed once it is complete, so a rejected push leaves the ring
//! untouched.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

pub(crate) fn byte_ring(capacity: usize) -> (HeapProd<u8>, HeapCons<u8>) {
    HeapRb::<u8>::new(capacity.max(1)).split()
}

/// Push `header` words followed by `body`. Returns false, writing nothing,
/// if the whole record does not fit.
pub(crate) fn push_record<const N: usize>(
    prod: &mut HeapProd<u8>,
    header: [u32; N],
    body: &[u8],
) -> bool {
    let total = N * 4 + body.len();
    if prod.vacant_len() < total {
        return false;
    }
    for word in header {
        prod.push_slice(&word.to_le_bytes());
    }
    prod.push_slice(body);
    true
}

/// Read the header of the next record without consuming it.
pub(crate) fn peek_header<const N: usize>(cons: &HeapCons<u8>) -> Option<[u32; N]> {
    if cons.occupied_len() < N * 4 {
        return None;
    }
    let mut raw = [0u8; 64];
    let raw = &mut raw[..N * 4];
    cons.peek_slice(raw);
    let mut header = [0u32; N];
    for (word, bytes) in header.iter_mut().zip(raw.chunks_exact(4)) {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    Some(header)
}

/// Consume a record whose header was peeked, copying up to `out.len()`
/// body bytes. Bytes past `out` are discarded.
///
/// Returns false if the body is not complete yet.
pub(crate) fn pop_record<const N: usize>(
    cons: &mut HeapCons<u8>,
    body_len: usize,
    out: &mut [u8],
) -> bool {
    if cons.occupied_len() < N * 4 + body_len {
        return false;
    }
    cons.skip(N * 4);
    let copied = body_len.min(out.len());
    cons.pop_slice(&mut out[..copied]);
    cons.skip(body_len - copied);
    true
}
