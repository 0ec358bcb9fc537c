//! # Envelope Codec
//!
//! Five big-endian 32-byte words, in this order:
//!
//! | Word | Field                   | Encoding                          |
//! |------|-------------------------|-----------------------------------|
//! | 0    | `source_chain_selector` | `uint64`, left-padded with zeros  |
//! | 1    | `sender`                | 20-byte address, left-padded      |
//! | 2    | `depositor`             | 20-byte address, left-padded      |
//! | 3    | `token`                 | 20-byte address, left-padded      |
//! | 4    | `amount`                | `uint256`, must fit in 128 bits   |
//!
//! This is the same layout an EVM contract produces with
//! `abi.encode(uint64, address, address, address, uint256)`, so every message
//! this crate encodes is byte-for-byte what an EVM endpoint would send.
//! The reverse holds for amounts up to `u128::MAX`: the amount word is read
//! as a full `uint256`, and one above that range is a well-formed word the
//! protocol refuses ([`DecodeError::AmountOutOfRange`]), since [`Amount`]
//! is 128 bits wide. Decoding is strict: exact length, zero padding,
//! nothing trailing.

use bytes::{Buf, BufMut, BytesMut};
use primitive_types::U256;

use super::{CrossChainMessage, DecodeError};
use crate::types::{Address, Amount, ChainSelector};

/// Width of one ABI word.
pub const WORD_SIZE: usize = 32;

/// Total encoded size of a [`CrossChainMessage`].
pub const ENCODED_LEN: usize = 5 * WORD_SIZE;

/// Encodes a message into its fixed 160-byte wire form.
pub fn encode(message: &CrossChainMessage) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(ENCODED_LEN);

    buf.put_bytes(0, WORD_SIZE - 8);
    buf.put_u64(message.source_chain_selector.value());

    for address in [&message.sender, &message.depositor, &message.token] {
        buf.put_bytes(0, WORD_SIZE - Address::LEN);
        buf.put_slice(address.as_bytes());
    }

    let mut amount = [0u8; WORD_SIZE];
    U256::from(message.amount).to_big_endian(&mut amount);
    buf.put_slice(&amount);

    debug_assert_eq!(buf.len(), ENCODED_LEN);
    buf.to_vec()
}

/// Decodes a wire payload.
///
/// # Errors
///
/// - [`DecodeError::Truncated`] / [`DecodeError::TrailingBytes`] if the
///   payload is not exactly [`ENCODED_LEN`] bytes.
/// - [`DecodeError::MalformedField`] if any padding byte is non-zero.
/// - [`DecodeError::AmountOutOfRange`] if the amount needs more than 128 bits.
pub fn decode(raw: &[u8]) -> Result<CrossChainMessage, DecodeError> {
    if raw.len() < ENCODED_LEN {
        return Err(DecodeError::Truncated {
            expected: ENCODED_LEN,
            got: raw.len(),
        });
    }
    if raw.len() > ENCODED_LEN {
        return Err(DecodeError::TrailingBytes {
            expected: ENCODED_LEN,
            got: raw.len(),
        });
    }

    let mut buf = raw;

    take_padding(&mut buf, WORD_SIZE - 8, "source_chain_selector")?;
    let source_chain_selector = ChainSelector(buf.get_u64());

    let sender = take_address(&mut buf, "sender")?;
    let depositor = take_address(&mut buf, "depositor")?;
    let token = take_address(&mut buf, "token")?;

    let word = U256::from_big_endian(&buf[..WORD_SIZE]);
    buf.advance(WORD_SIZE);
    let amount = Amount::try_from(word).map_err(|_| DecodeError::AmountOutOfRange)?;

    Ok(CrossChainMessage {
        source_chain_selector,
        sender,
        depositor,
        token,
        amount,
    })
}

fn take_padding(buf: &mut &[u8], len: usize, field: &'static str) -> Result<(), DecodeError> {
    if buf[..len].iter().any(|b| *b != 0) {
        return Err(DecodeError::MalformedField { field });
    }
    buf.advance(len);
    Ok(())
}

fn take_address(buf: &mut &[u8], field: &'static str) -> Result<Address, DecodeError> {
    take_padding(buf, WORD_SIZE - Address::LEN, field)?;
    let mut bytes = [0u8; Address::LEN];
    buf.copy_to_slice(&mut bytes);
    Ok(Address::from_bytes(bytes))
}
