//! Dispute manager calldata: encoding of resolution calls and decoding of unsigned payloads.
//!
//! Selector is the first four bytes of keccak-256 of the function signature; every argument is
//! one 32-byte word (uint256 big-endian, bool as 0/1, bytes32 as-is).

use crate::chain::bytes::Bytes32;
use crate::chain::submitter::UnsignedTransaction;
use serde::Serialize;
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

const WORD: usize = 32;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("payload envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload too short: {0} bytes")]
    TooShort(usize),
    #[error("unknown function selector 0x{0}")]
    UnknownSelector(String),
    #[error("{function}: expected {expected} argument bytes, got {actual}")]
    BadLength {
        function: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{0}: bool word is neither 0 nor 1")]
    InvalidBool(&'static str),
    #[error("{0}: uint256 does not fit in 128 bits")]
    Overflow(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionCall {
    Accept {
        dispute_id: Bytes32,
        tokens_slash: u128,
    },
    /// Accepts a dispute and resolves its related dispute in the same call.
    AcceptConflict {
        dispute_id: Bytes32,
        tokens_slash: u128,
        accept_related: bool,
        tokens_slash_related: u128,
    },
    Reject {
        dispute_id: Bytes32,
    },
    Draw {
        dispute_id: Bytes32,
    },
}

const ACCEPT: &str = "acceptDispute(bytes32,uint256)";
const ACCEPT_CONFLICT: &str = "acceptDisputeConflict(bytes32,uint256,bool,uint256)";
const REJECT: &str = "rejectDispute(bytes32)";
const DRAW: &str = "drawDispute(bytes32)";

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

fn uint_word(v: u128) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[16..].copy_from_slice(&v.to_be_bytes());
    w
}

fn bool_word(b: bool) -> [u8; WORD] {
    uint_word(u128::from(b))
}

fn read_uint(word: &[u8], function: &'static str) -> Result<u128, DecodeError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow(function));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..WORD]);
    Ok(u128::from_be_bytes(low))
}

fn read_bool(word: &[u8], function: &'static str) -> Result<bool, DecodeError> {
    match read_uint(word, function) {
        Ok(0) => Ok(false),
        Ok(1) => Ok(true),
        _ => Err(DecodeError::InvalidBool(function)),
    }
}

fn read_bytes32(word: &[u8]) -> Bytes32 {
    let mut b = [0u8; WORD];
    b.copy_from_slice(&word[..WORD]);
    Bytes32::new(b)
}

impl ResolutionCall {
    pub fn signature(&self) -> &'static str {
        match self {
            ResolutionCall::Accept { .. } => ACCEPT,
            ResolutionCall::AcceptConflict { .. } => ACCEPT_CONFLICT,
            ResolutionCall::Reject { .. } => REJECT,
            ResolutionCall::Draw { .. } => DRAW,
        }
    }

    pub fn dispute_id(&self) -> Bytes32 {
        match self {
            ResolutionCall::Accept { dispute_id, .. }
            | ResolutionCall::AcceptConflict { dispute_id, .. }
            | ResolutionCall::Reject { dispute_id }
            | ResolutionCall::Draw { dispute_id } => *dispute_id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = selector(self.signature()).to_vec();
        out.extend_from_slice(self.dispute_id().as_bytes());
        match self {
            ResolutionCall::Accept { tokens_slash, .. } => {
                out.extend_from_slice(&uint_word(*tokens_slash));
            }
            ResolutionCall::AcceptConflict {
                tokens_slash,
                accept_related,
                tokens_slash_related,
                ..
            } => {
                out.extend_from_slice(&uint_word(*tokens_slash));
                out.extend_from_slice(&bool_word(*accept_related));
                out.extend_from_slice(&uint_word(*tokens_slash_related));
            }
            ResolutionCall::Reject { .. } | ResolutionCall::Draw { .. } => {}
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < 4 {
            return Err(DecodeError::TooShort(data.len()));
        }
        let (sel, args) = data.split_at(4);
        let (function, words) = [ACCEPT, ACCEPT_CONFLICT, REJECT, DRAW]
            .into_iter()
            .map(|sig| (sig, sig.matches(',').count() + 1))
            .find(|(sig, _)| selector(sig) == sel)
            .ok_or_else(|| DecodeError::UnknownSelector(hex::encode(sel)))?;
        if args.len() != words * WORD {
            return Err(DecodeError::BadLength {
                function,
                expected: words * WORD,
                actual: args.len(),
            });
        }
        let w: Vec<&[u8]> = args.chunks(WORD).collect();
        let dispute_id = read_bytes32(w[0]);
        let call = match function {
            ACCEPT => ResolutionCall::Accept {
                dispute_id,
                tokens_slash: read_uint(w[1], function)?,
            },
            ACCEPT_CONFLICT => ResolutionCall::AcceptConflict {
                dispute_id,
                tokens_slash: read_uint(w[1], function)?,
                accept_related: read_bool(w[2], function)?,
                tokens_slash_related: read_uint(w[3], function)?,
            },
            REJECT => ResolutionCall::Reject { dispute_id },
            _ => ResolutionCall::Draw { dispute_id },
        };
        Ok(call)
    }

    /// Unsigned request to the dispute manager at `to`.
    pub fn to_transaction(&self, to: &str, from: Option<String>) -> UnsignedTransaction {
        UnsignedTransaction {
            to: to.to_string(),
            data: format!("0x{}", hex::encode(self.encode())),
            value: "0x0".to_string(),
            from,
        }
    }

    pub fn arguments(&self) -> Vec<DecodedArgument> {
        let arg = |name: &str, kind: &str, value: String| DecodedArgument {
            name: name.to_string(),
            kind: kind.to_string(),
            value,
        };
        let mut out = vec![arg("disputeId", "bytes32", self.dispute_id().to_hex())];
        match self {
            ResolutionCall::Accept { tokens_slash, .. } => {
                out.push(arg("tokensSlash", "uint256", tokens_slash.to_string()));
            }
            ResolutionCall::AcceptConflict {
                tokens_slash,
                accept_related,
                tokens_slash_related,
                ..
            } => {
                out.push(arg("tokensSlash", "uint256", tokens_slash.to_string()));
                out.push(arg("acceptDisputeInConflict", "bool", accept_related.to_string()));
                out.push(arg(
                    "tokensSlashRelated",
                    "uint256",
                    tokens_slash_related.to_string(),
                ));
            }
            ResolutionCall::Reject { .. } | ResolutionCall::Draw { .. } => {}
        }
        out
    }
}

impl fmt::Display for ResolutionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.arguments().into_iter().map(|a| a.value).collect();
        let name = self.signature().split('(').next().unwrap_or_default();
        write!(f, "{}({})", name, args.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecodedArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecodedCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub function: String,
    pub arguments: Vec<DecodedArgument>,
    #[serde(skip)]
    pub call: Option<ResolutionCall>,
}

/// Decode raw calldata hex (`0x…`) or the JSON `{ to, data, value }` envelope of a dry run.
pub fn decode_payload(payload: &str) -> Result<DecodedCall, DecodeError> {
    let payload = payload.trim();
    let (to, data) = if payload.starts_with('{') {
        let tx: UnsignedTransaction = serde_json::from_str(payload)?;
        (Some(tx.to), tx.data)
    } else {
        (None, payload.to_string())
    };
    let digits = data.strip_prefix("0x").unwrap_or(&data);
    let bytes = hex::decode(digits)?;
    let call = ResolutionCall::decode(&bytes)?;
    Ok(DecodedCall {
        to,
        function: call.signature().to_string(),
        arguments: call.arguments(),
        call: Some(call),
    })
}
