//! Conversion of Kubernetes resource quantities into the units reported by the collector.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Bytes per GiB. Memory is reported in binary gigabytes.
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseQuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity number: {0:?}")]
    Number(String),

    #[error("invalid quantity suffix: {0:?}")]
    Suffix(String),
}

/// Parses a quantity into its plain numeric value (cores for CPU, bytes for memory).
pub fn parse(q: &str) -> Result<f64, ParseQuantityError> {
    let q = q.trim();
    if q.is_empty() {
        return Err(ParseQuantityError::Empty);
    }

    let split = q
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '+' || c == '-'))))
        .map_or(q.len(), |(i, _)| i);
    let (number, suffix) = q.split_at(split);

    let value = number
        .parse::<f64>()
        .map_err(|_| ParseQuantityError::Number(number.to_string()))?;

    let scale = match suffix {
        "" => Scale::Decimal(0),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        "Ki" => Scale::Binary(10),
        "Mi" => Scale::Binary(20),
        "Gi" => Scale::Binary(30),
        "Ti" => Scale::Binary(40),
        "Pi" => Scale::Binary(50),
        "Ei" => Scale::Binary(60),
        s => {
            let exp = s
                .strip_prefix('e')
                .or_else(|| s.strip_prefix('E'))
                .and_then(|e| e.parse::<i32>().ok())
                .ok_or_else(|| ParseQuantityError::Suffix(s.to_string()))?;
            Scale::Decimal(exp)
        }
    };

    Ok(scale.apply(value))
}

/// CPU in (possibly fractional) cores.
pub fn cpu_cores(q: &Quantity) -> Result<f64, ParseQuantityError> {
    parse(&q.0)
}

/// CPU rounded up to whole cores, as node capacity is reported.
pub fn whole_cores(q: &Quantity) -> Result<f64, ParseQuantityError> {
    parse(&q.0).map(f64::ceil)
}

/// Memory in GiB, computed from the byte count rounded up.
pub fn memory_gib(q: &Quantity) -> Result<f64, ParseQuantityError> {
    parse(&q.0).map(|bytes| bytes.ceil() / GIB)
}

enum Scale {
    Decimal(i32),
    Binary(i32),
}

impl Scale {
    fn apply(self, value: f64) -> f64 {
        match self {
            // Dividing keeps values like `1000m` exact.
            Self::Decimal(exp) if exp < 0 => value / 10f64.powi(-exp),
            Self::Decimal(exp) => value * 10f64.powi(exp),
            Self::Binary(exp) => value * 2f64.powi(exp),
        }
    }
}
