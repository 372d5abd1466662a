//! Fragment framing for the message characteristic
//!
//! Every radio write starts with a one-byte flag. A first fragment carries a
//! two-byte big-endian total payload length right after the flag; a
//! continuation carries only payload bytes.

use crate::errors::FragmentError;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Flag byte of the first fragment of a message
pub const FLAG_FIRST: u8 = 1;

/// Flag byte of every following fragment
pub const FLAG_CONTINUATION: u8 = 0;

/// Bytes taken by the flag and length of a first fragment
pub const FIRST_HEADER_LEN: usize = 3;

/// Bytes taken by the flag of a continuation fragment
pub const CONTINUATION_HEADER_LEN: usize = 1;

/// Largest payload the two-byte length field can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

// ----------------------------------------------------------------------------
// Parsed Fragment
// ----------------------------------------------------------------------------

/// A single radio write, parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment<'a> {
    First { total_len: usize, payload: &'a [u8] },
    Continuation { payload: &'a [u8] },
}

impl<'a> Fragment<'a> {
    /// Parse the header of a raw chunk
    pub fn parse(chunk: &'a [u8]) -> Result<Self, FragmentError> {
        let (&flag, rest) = chunk.split_first().ok_or(FragmentError::EmptyFragment)?;
        match flag {
            FLAG_FIRST => {
                if rest.len() < 2 {
                    return Err(FragmentError::TruncatedHeader { actual: chunk.len() });
                }
                let total_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
                Ok(Fragment::First {
                    total_len,
                    payload: &rest[2..],
                })
            }
            FLAG_CONTINUATION => Ok(Fragment::Continuation { payload: rest }),
            flag => Err(FragmentError::UnknownFlag { flag }),
        }
    }

    pub fn payload(&self) -> &'a [u8] {
        match self {
            Fragment::First { payload, .. } | Fragment::Continuation { payload } => payload,
        }
    }
}

// ----------------------------------------------------------------------------
// Fragmenter
// ----------------------------------------------------------------------------

/// Split an encoded envelope into MTU-bounded radio writes
pub fn fragment_payload(payload: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>, FragmentError> {
    if mtu <= FIRST_HEADER_LEN {
        return Err(FragmentError::MtuTooSmall { mtu });
    }
    if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
        return Err(FragmentError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let first_len = payload.len().min(mtu - FIRST_HEADER_LEN);
    let (head, mut rest) = payload.split_at(first_len);

    let mut first = Vec::with_capacity(FIRST_HEADER_LEN + head.len());
    first.push(FLAG_FIRST);
    first.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    first.extend_from_slice(head);

    let continuation_cap = mtu - CONTINUATION_HEADER_LEN;
    let mut fragments = Vec::with_capacity(1 + rest.len().div_ceil(continuation_cap));
    fragments.push(first);

    while !rest.is_empty() {
        let take = rest.len().min(continuation_cap);
        let (chunk, tail) = rest.split_at(take);
        let mut fragment = Vec::with_capacity(CONTINUATION_HEADER_LEN + chunk.len());
        fragment.push(FLAG_CONTINUATION);
        fragment.extend_from_slice(chunk);
        fragments.push(fragment);
        rest = tail;
    }

    Ok(fragments)
}
