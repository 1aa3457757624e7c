//! Base45 text encoding (RFC 9285).
//!
//! Two input bytes `[a, b]` form `n = a * 256 + b`, written as three symbols
//! `c, d, e` with `n = c + d * 45 + e * 45²`. A trailing single byte becomes
//! two symbols. Decoding reverses this and rejects any group whose value
//! does not fit the byte count it stands for.

use crate::error::VerifyError;

/// The 45-symbol alphabet, indexed by digit value.
pub const ALPHABET: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

const fn build_decode_table() -> [u8; 256] {
    let mut table = [u8::MAX; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

static DECODE_TABLE: [u8; 256] = build_decode_table();

/// Encode bytes as Base45 text.
#[must_use]
pub fn encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len() / 2 * 3 + 2);
    for chunk in input.chunks(2) {
        let (mut n, digits) = match *chunk {
            [a, b] => (u32::from(a) * 256 + u32::from(b), 3),
            _ => (u32::from(chunk[0]), 2),
        };
        for _ in 0..digits {
            out.push(char::from(ALPHABET[(n % 45) as usize]));
            n /= 45;
        }
    }
    out
}

/// Decode Base45 text.
///
/// # Errors
///
/// Returns [`VerifyError::Base45Decode`] for a symbol outside the alphabet,
/// a dangling single-symbol group, or a group whose value overflows.
pub fn decode(input: &str) -> Result<Vec<u8>, VerifyError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 3 * 2 + 1);

    for group in bytes.chunks(3) {
        if group.len() < 2 {
            return Err(VerifyError::base45("invalid input length"));
        }

        let mut n: u32 = 0;
        for &symbol in group.iter().rev() {
            let digit = DECODE_TABLE[usize::from(symbol)];
            if digit == u8::MAX {
                return Err(VerifyError::base45(format!(
                    "invalid character {:?}",
                    char::from(symbol)
                )));
            }
            n = n * 45 + u32::from(digit);
        }

        if group.len() == 3 {
            if n > 0xFFFF {
                return Err(VerifyError::base45("invalid character sequence"));
            }
            out.push((n >> 8) as u8);
            out.push((n & 0xFF) as u8);
        } else {
            if n > 0xFF {
                return Err(VerifyError::base45("invalid character sequence"));
            }
            out.push(n as u8);
        }
    }

    Ok(out)
}
