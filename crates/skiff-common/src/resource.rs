//! Resource quantity parsing.
//!
//! Container configs may give CPU and memory either as plain numbers or as
//! Kubernetes-style quantity strings:
//! - CPU: "500m" (millicores), "2" (cores), "0.5" (half a core)
//! - Memory: "128Mi", "1Gi", "512M", "1G", "1024" (bytes)
//!
//! Memory differs from Kubernetes in two ways. A lowercase `m` suffix is
//! rejected, since Kubernetes reads it as milli and a fraction of a byte is
//! meaningless. Lowercase `g` and `t` are accepted as aliases for `G` and `T`.

use serde::{Deserialize, Deserializer};

use crate::error::{SkiffError, SkiffResult};

const KI: u64 = 1024;
const MI: u64 = 1024 * KI;
const GI: u64 = 1024 * MI;
const TI: u64 = 1024 * GI;

const BINARY_SUFFIXES: [(&str, u64); 4] = [("Ki", KI), ("Mi", MI), ("Gi", GI), ("Ti", TI)];

const DECIMAL_SUFFIXES: [(&str, u64); 6] = [
    ("k", 1000),
    ("M", 1000 * 1000),
    ("g", 1000 * 1000 * 1000),
    ("G", 1000 * 1000 * 1000),
    ("t", 1000 * 1000 * 1000 * 1000),
    ("T", 1000 * 1000 * 1000 * 1000),
];

/// Parse a CPU quantity string into fractional cores.
///
/// - "500m" -> 0.5
/// - "2" -> 2.0
/// - "0.25" -> 0.25
pub fn parse_cpu(s: &str) -> SkiffResult<f64> {
    let s = s.trim();
    let invalid = || SkiffError::InvalidResourceQuantity {
        value: s.to_string(),
    };

    let cores = if let Some(stripped) = s.strip_suffix('m') {
        let millicores: u64 = stripped.parse().map_err(|_| invalid())?;
        millicores as f64 / 1000.0
    } else {
        s.parse::<f64>().map_err(|_| invalid())?
    };

    if !cores.is_finite() || cores < 0.0 {
        return Err(invalid());
    }

    Ok(cores)
}

/// Parse a memory quantity string into bytes.
///
/// Binary suffixes (`Ki`, `Mi`, `Gi`, `Ti`) are powers of 1024, decimal
/// suffixes (`k`, `M`, `G`, `T`) powers of 1000. A plain number is bytes.
/// See the module docs for the suffixes that differ from Kubernetes.
pub fn parse_memory(s: &str) -> SkiffResult<u64> {
    let s = s.trim();
    let invalid = || SkiffError::InvalidResourceQuantity {
        value: s.to_string(),
    };

    for (suffix, multiplier) in BINARY_SUFFIXES.into_iter().chain(DECIMAL_SUFFIXES) {
        if let Some(stripped) = s.strip_suffix(suffix) {
            let value: u64 = stripped.parse().map_err(|_| invalid())?;
            return value.checked_mul(multiplier).ok_or_else(invalid);
        }
    }

    s.parse().map_err(|_| invalid())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CpuInput {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MemoryInput {
    Bytes(u64),
    Text(String),
}

/// Serde helper accepting `0.5` or `"500m"` for a CPU field.
pub fn deserialize_cpu<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match CpuInput::deserialize(deserializer)? {
        CpuInput::Number(cores) => Ok(cores),
        CpuInput::Text(text) => parse_cpu(&text).map_err(serde::de::Error::custom),
    }
}

/// Serde helper accepting `536870912` or `"512Mi"` for a memory field.
pub fn deserialize_memory<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match MemoryInput::deserialize(deserializer)? {
        MemoryInput::Bytes(bytes) => Ok(bytes),
        MemoryInput::Text(text) => parse_memory(&text).map_err(serde::de::Error::custom),
    }
}
