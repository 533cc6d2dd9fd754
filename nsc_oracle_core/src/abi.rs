//nsc_oracle_core/abi.rs

//! Minimal Solidity ABI tuple codec.
//!
//! Covers the types the bridge envelope uses. Output is the bare tuple
//! encoding (the same bytes a method call carries after its 4-byte
//! selector); no selector is ever produced.

use crate::error::OracleError;
use crate::market::Address;

pub const WORD: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Bool,
    Uint256,
    FixedBytes32,
    Bytes,
    String,
}

impl ParamType {
    pub fn is_dynamic(self) -> bool {
        matches!(self, ParamType::Bytes | ParamType::String)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Bool(bool),
    /// uint256 restricted to values that fit in 128 bits.
    Uint(u128),
    FixedBytes32([u8; 32]),
    Bytes(Vec<u8>),
    String(String),
}

impl Token {
    pub fn param_type(&self) -> ParamType {
        match self {
            Token::Address(_) => ParamType::Address,
            Token::Bool(_) => ParamType::Bool,
            Token::Uint(_) => ParamType::Uint256,
            Token::FixedBytes32(_) => ParamType::FixedBytes32,
            Token::Bytes(_) => ParamType::Bytes,
            Token::String(_) => ParamType::String,
        }
    }
}

/// Encode `tokens` as a tuple of `types`. Arity and per-position type must match.
pub fn encode_tuple(types: &[ParamType], tokens: &[Token]) -> Result<Vec<u8>, OracleError> {
    if types.len() != tokens.len() {
        return Err(OracleError::schema(format!(
            "tuple arity: expected {} values, got {}",
            types.len(),
            tokens.len()
        )));
    }
    for (i, (ty, tok)) in types.iter().zip(tokens).enumerate() {
        if tok.param_type() != *ty {
            return Err(OracleError::schema(format!(
                "position {i}: expected {ty:?}, got {:?}",
                tok.param_type()
            )));
        }
    }

    let head_len = WORD * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for tok in tokens {
        match tok {
            Token::Address(a) => {
                let mut w = [0u8; WORD];
                w[12..].copy_from_slice(a.as_bytes());
                head.extend_from_slice(&w);
            }
            Token::Bool(b) => head.extend_from_slice(&uint_word(u128::from(*b))),
            Token::Uint(v) => head.extend_from_slice(&uint_word(*v)),
            Token::FixedBytes32(b) => head.extend_from_slice(b),
            Token::Bytes(data) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                push_dynamic(&mut tail, data);
            }
            Token::String(s) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                push_dynamic(&mut tail, s.as_bytes());
            }
        }
    }

    head.extend_from_slice(&tail);
    Ok(head)
}

/// Decode a tuple of `types` from `data`.
pub fn decode_tuple(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, OracleError> {
    let mut out = Vec::with_capacity(types.len());
    for (i, ty) in types.iter().enumerate() {
        let word = read_word(data, i * WORD)?;
        let tok = match ty {
            ParamType::Address => {
                if word[..12].iter().any(|b| *b != 0) {
                    return Err(OracleError::schema(format!("position {i}: dirty address padding")));
                }
                let mut a = [0u8; 20];
                a.copy_from_slice(&word[12..]);
                Token::Address(Address(a))
            }
            ParamType::Bool => match word_to_u128(word, i)? {
                0 => Token::Bool(false),
                1 => Token::Bool(true),
                v => return Err(OracleError::schema(format!("position {i}: bool word {v}"))),
            },
            ParamType::Uint256 => Token::Uint(word_to_u128(word, i)?),
            ParamType::FixedBytes32 => {
                let mut b = [0u8; 32];
                b.copy_from_slice(word);
                Token::FixedBytes32(b)
            }
            ParamType::Bytes => Token::Bytes(read_dynamic(data, word, i)?.to_vec()),
            ParamType::String => {
                let raw = read_dynamic(data, word, i)?;
                let s = std::str::from_utf8(raw)
                    .map_err(|e| OracleError::schema(format!("position {i}: {e}")))?;
                Token::String(s.to_owned())
            }
        };
        out.push(tok);
    }
    Ok(out)
}

fn uint_word(v: u128) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[16..].copy_from_slice(&v.to_be_bytes());
    w
}

fn push_dynamic(tail: &mut Vec<u8>, data: &[u8]) {
    tail.extend_from_slice(&uint_word(data.len() as u128));
    tail.extend_from_slice(data);
    let pad = (WORD - data.len() % WORD) % WORD;
    tail.resize(tail.len() + pad, 0);
}

fn read_word(data: &[u8], at: usize) -> Result<&[u8], OracleError> {
    at.checked_add(WORD)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| OracleError::schema(format!("truncated input at byte {at}")))
}

fn word_to_u128(word: &[u8], i: usize) -> Result<u128, OracleError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(OracleError::schema(format!("position {i}: integer exceeds 128 bits")));
    }
    let mut b = [0u8; 16];
    b.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(b))
}

fn read_dynamic<'a>(data: &'a [u8], offset_word: &[u8], i: usize) -> Result<&'a [u8], OracleError> {
    let offset = usize::try_from(word_to_u128(offset_word, i)?)
        .map_err(|_| OracleError::schema(format!("position {i}: offset out of range")))?;
    let len_word = read_word(data, offset)?;
    let len = usize::try_from(word_to_u128(len_word, i)?)
        .map_err(|_| OracleError::schema(format!("position {i}: length out of range")))?;
    let start = offset + WORD;
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| OracleError::schema(format!("position {i}: dynamic value truncated")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_values_fill_one_word_each() {
        let enc = encode_tuple(
            &[ParamType::Bool, ParamType::Uint256],
            &[Token::Bool(true), Token::Uint(258)],
        )
        .unwrap();
        assert_eq!(enc.len(), 64);
        assert_eq!(enc[31], 1);
        assert_eq!(&enc[62..64], &[1, 2]);
    }

    #[test]
    fn dynamic_string_layout() {
        // Matches abi.encode(uint256(1), "abc").
        let enc = encode_tuple(
            &[ParamType::Uint256, ParamType::String],
            &[Token::Uint(1), Token::String("abc".into())],
        )
        .unwrap();
        let hex = hex::encode(&enc);
        assert_eq!(
            hex,
            concat!(
                "0000000000000000000000000000000000000000000000000000000000000001",
                "0000000000000000000000000000000000000000000000000000000000000040",
                "0000000000000000000000000000000000000000000000000000000000000003",
                "6162630000000000000000000000000000000000000000000000000000000000",
            )
        );
    }

    #[test]
    fn empty_bytes_take_only_a_length_word() {
        let enc = encode_tuple(&[ParamType::Bytes], &[Token::Bytes(Vec::new())]).unwrap();
        assert_eq!(enc.len(), 64);
        assert_eq!(enc[31], 0x20);
        assert!(enc[32..].iter().all(|b| *b == 0));
    }

    #[test]
    fn arity_and_type_mismatch_are_schema_errors() {
        let err = encode_tuple(&[ParamType::Bool], &[]).unwrap_err();
        assert!(matches!(err, OracleError::Schema { .. }));
        let err = encode_tuple(&[ParamType::Bool], &[Token::Uint(1)]).unwrap_err();
        assert!(matches!(err, OracleError::Schema { .. }));
    }

    #[test]
    fn decode_rejects_truncated_and_dirty_input() {
        assert!(decode_tuple(&[ParamType::Uint256], &[0u8; 31]).is_err());
        let mut word = [0u8; 32];
        word[31] = 2;
        assert!(decode_tuple(&[ParamType::Bool], &word).is_err());
        let mut word = [0u8; 32];
        word[0] = 1;
        assert!(decode_tuple(&[ParamType::Address], &word).is_err());
        let mut word = [0u8; 32];
        word[31] = 0x40;
        assert!(decode_tuple(&[ParamType::String], &word).is_err());
    }
}
