//! PostgreSQL type identifiers and text-format encoding.
//!
//! Every value this server sends travels in text format (format code 0), so
//! the only type-level concerns are choosing an OID for each result column
//! and rendering values the way PostgreSQL's output functions would.
//! Reference: https://www.postgresql.org/docs/current/protocol-overview.html#PROTOCOL-FORMAT-CODES

// ============================================================================
// Type OIDs
// ============================================================================

/// PostgreSQL type object identifiers (OIDs).
///
/// These are the built-in type OIDs from PostgreSQL's `pg_type` catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid(pub i32);

impl Oid {
    // Binary data
    pub const BYTEA: Oid = Oid(17);

    // Integer types
    pub const INT8: Oid = Oid(20);
    pub const INT4: Oid = Oid(23);

    // Text types
    pub const TEXT: Oid = Oid(25);

    // Floating point types
    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);

    /// Create from raw i32 value
    #[inline]
    pub fn from_i32(oid: i32) -> Self {
        Oid(oid)
    }

    /// Get the raw i32 value
    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

// ============================================================================
// Text format
// ============================================================================

/// Significant decimal digits a double always carries (`DBL_DIG`).
const FLOAT8_DIGITS: i32 = 15;

/// Render a double the way PostgreSQL's `float8out` does: shortest
/// round-trip digits, no trailing `.0`, spelled-out infinities, and
/// exponent form (`1e+21`, `1.5e-05`) when the decimal exponent is below -4
/// or at least 15.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }

    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if value != 0.0 && (exponent < -4 || exponent >= FLOAT8_DIGITS) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        value.to_string()
    }
}

/// Render bytes in bytea hex output format (`\x` followed by lowercase hex).
pub fn format_bytea(data: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let mut out = String::with_capacity(2 + data.len() * 2);
    out.push_str("\\x");
    for byte in data {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
