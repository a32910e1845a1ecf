//! Normalization of operator input and wire values (hex quantities, addresses, epoch ranges, GRT amounts).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid epoch: {0}")]
    InvalidEpoch(String),
    #[error("invalid epoch range: {0}")]
    InvalidEpochRange(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid deployment id: {0}")]
    InvalidDeployment(String),
    #[error("invalid dispute status: {0}")]
    InvalidStatus(String),
}

/// Parse a JSON-RPC quantity (`0x`-prefixed hex) or a plain decimal string.
pub fn parse_quantity(s: &str) -> Result<u64, NormalizeError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex_digits) if !hex_digits.is_empty() => u64::from_str_radix(hex_digits, 16),
        Some(_) => return Err(NormalizeError::InvalidQuantity(s.to_string())),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| NormalizeError::InvalidQuantity(s.to_string()))
}

/// Format a block number as a JSON-RPC quantity.
pub fn to_quantity(n: u64) -> String {
    format!("0x{:x}", n)
}

/// Lowercase, `0x`-prefixed 20-byte address.
pub fn normalize_address(s: &str) -> Result<String, NormalizeError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(NormalizeError::InvalidAddress(s.to_string()));
    }
    Ok(format!("0x{}", digits.to_lowercase()))
}

/// Widest range `parse_epoch_range` accepts.
pub const MAX_EPOCH_SPAN: u64 = 1_000;

/// Parse `"1132"` or `"1130-1135"` (inclusive) into the list of epochs.
pub fn parse_epoch_range(arg: &str) -> Result<Vec<u64>, NormalizeError> {
    let arg = arg.trim();
    if let Some((start, end)) = arg.split_once('-') {
        let start = start
            .trim()
            .parse::<u64>()
            .map_err(|_| NormalizeError::InvalidEpochRange(arg.to_string()))?;
        let end = end
            .trim()
            .parse::<u64>()
            .map_err(|_| NormalizeError::InvalidEpochRange(arg.to_string()))?;
        if start > end || end - start >= MAX_EPOCH_SPAN {
            return Err(NormalizeError::InvalidEpochRange(arg.to_string()));
        }
        return Ok((start..=end).collect());
    }
    let epoch = arg
        .parse::<u64>()
        .map_err(|_| NormalizeError::InvalidEpoch(arg.to_string()))?;
    Ok(vec![epoch])
}

const GRT_DECIMALS: u32 = 18;

/// Parse a GRT amount ("1000", "0.5") into wei (18 decimals).
pub fn parse_grt(s: &str) -> Result<u128, NormalizeError> {
    let s = s.trim();
    let err = || NormalizeError::InvalidAmount(s.to_string());
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(err());
    }
    if frac.len() > GRT_DECIMALS as usize
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return Err(err());
    }
    let unit = 10u128.pow(GRT_DECIMALS);
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| err())?
    };
    let frac_wei: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = GRT_DECIMALS as usize);
        padded.parse().map_err(|_| err())?
    };
    whole
        .checked_mul(unit)
        .and_then(|w| w.checked_add(frac_wei))
        .ok_or_else(err)
}

/// CAIP-2 chain id: bare numeric ids are treated as EVM (`eip155:<id>`).
pub fn normalize_chain_id(chain: &str) -> String {
    let chain = chain.trim();
    if !chain.is_empty() && chain.chars().all(|c| c.is_ascii_digit()) {
        format!("eip155:{}", chain)
    } else {
        chain.to_string()
    }
}
