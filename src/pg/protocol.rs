//! PostgreSQL wire protocol message encoding and decoding.
//!
//! This module implements the server side of the PostgreSQL v3 protocol:
//! frontend messages are decoded, backend messages are encoded. The reverse
//! directions are implemented too so the codec can drive a conversation from
//! either end.
//! Reference: https://www.postgresql.org/docs/current/protocol-message-formats.html

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::error::{PgError, PgResult, Severity, SqlState};
use super::types::Oid;

// ============================================================================
// Protocol Constants
// ============================================================================

/// PostgreSQL protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 196608; // (3 << 16) | 0

/// Startup codes that take the place of a protocol version.
pub const CANCEL_REQUEST_CODE: i32 = 80877102; // (1234 << 16) | 5678
pub const SSL_REQUEST_CODE: i32 = 80877103; // (1234 << 16) | 5679
pub const GSSENC_REQUEST_CODE: i32 = 80877104; // (1234 << 16) | 5680

/// Single-byte answer declining an SSL or GSS encryption request.
pub const ENCRYPTION_DECLINED: u8 = b'N';

/// Upper bound on a declared message length (100MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Tag byte + length field.
const HEADER_LEN: usize = 5;

/// Length field + version field of a startup packet.
const STARTUP_HEADER_LEN: usize = 8;

/// Format codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum Format {
    Text = 0,
    Binary = 1,
}

/// Transaction status indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Idle (not in a transaction block)
    Idle,
    /// In a transaction block
    InTransaction,
    /// In a failed transaction block
    Failed,
}

impl TransactionStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            TransactionStatus::Idle => b'I',
            TransactionStatus::InTransaction => b'T',
            TransactionStatus::Failed => b'E',
        }
    }
}

impl From<u8> for TransactionStatus {
    fn from(b: u8) -> Self {
        match b {
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::Failed,
            _ => TransactionStatus::Idle,
        }
    }
}

// ============================================================================
// Framing
// ============================================================================

/// Which side of the conversation produced a message.
///
/// Tags are reused across directions (`S` is Sync from the client and
/// ParameterStatus from the server, `E` is Execute and ErrorResponse), so the
/// trailer rule depends on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Frontend,
    Backend,
}

impl Origin {
    /// Number of NUL bytes the framing appends after the payload.
    pub fn trailer_len(self, tag: u8) -> usize {
        match (self, tag) {
            (Origin::Backend, b'C') | (Origin::Backend, b'E') | (Origin::Frontend, b'Q') => 1,
            _ => 0,
        }
    }
}

/// A framed message: type tag plus payload, without the length field or
/// trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub tag: u8,
    pub payload: Bytes,
}

impl RawMessage {
    pub fn new(tag: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Value of the length field: itself, the payload and any trailer.
    #[inline]
    pub fn declared_len(&self, origin: Origin) -> usize {
        4 + self.payload.len() + origin.trailer_len(self.tag)
    }

    /// Append the framed message to `buf`.
    pub fn encode(&self, origin: Origin, buf: &mut BytesMut) {
        let len = self.declared_len(origin);
        buf.reserve(1 + len);
        buf.put_u8(self.tag);
        buf.put_i32(len as i32);
        buf.put_slice(&self.payload);
        if origin.trailer_len(self.tag) == 1 {
            buf.put_u8(0);
        }
    }

    /// Split one complete message off the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; the buffer is left
    /// untouched in that case. Several messages in one buffer are taken one
    /// call at a time.
    pub fn decode(buf: &mut BytesMut, origin: Origin, max_len: usize) -> PgResult<Option<Self>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let tag = buf[0];
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        let trailer = origin.trailer_len(tag);

        if len < (4 + trailer) as i32 {
            return Err(PgError::Protocol(format!(
                "Invalid length {} for message '{}'",
                len, tag as char
            )));
        }

        let len = len as usize;
        if len > max_len {
            return Err(PgError::MessageTooLarge { len, max: max_len });
        }

        let total_len = 1 + len; // type byte + length field value (includes length field itself)
        if buf.len() < total_len {
            buf.reserve(total_len - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(total_len);
        frame.advance(HEADER_LEN);

        if trailer == 1 {
            if frame.last() != Some(&0) {
                return Err(PgError::Protocol(format!(
                    "Missing null terminator in message '{}'",
                    tag as char
                )));
            }
            frame.truncate(frame.len() - 1);
        }

        Ok(Some(RawMessage {
            tag,
            payload: frame.freeze(),
        }))
    }
}

// ============================================================================
// Startup Packets (untagged)
// ============================================================================

/// The first packet a client sends. It carries no tag byte; the version field
/// tells the variants apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupRequest {
    /// Protocol 3.0 startup with `key=value` parameters in arrival order.
    Startup { parameters: Vec<(String, String)> },
    /// Client asks to upgrade to TLS.
    SslRequest,
    /// Client asks to upgrade to GSSAPI encryption.
    GssEncRequest,
    /// Out-of-band cancellation of another connection's query.
    CancelRequest { process_id: i32, secret_key: i32 },
}

impl StartupRequest {
    /// Split one startup packet off the front of `buf`.
    ///
    /// Any version other than 3.0 or one of the special request codes fails
    /// with `UnsupportedProtocolVersion`.
    pub fn decode(buf: &mut BytesMut, max_len: usize) -> PgResult<Option<Self>> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if len < STARTUP_HEADER_LEN as i32 {
            return Err(PgError::Protocol(format!(
                "Invalid startup packet length: {}",
                len
            )));
        }

        let len = len as usize;
        if len > max_len {
            return Err(PgError::MessageTooLarge { len, max: max_len });
        }

        if buf.len() < len {
            buf.reserve(len - buf.len());
            return Ok(None);
        }

        let mut body = buf.split_to(len).freeze();
        body.advance(4);
        let version = body.get_i32();

        match version {
            PROTOCOL_VERSION => {
                let mut parameters = Vec::new();
                while body.has_remaining() {
                    let key = read_cstring(&mut body)?;
                    if key.is_empty() {
                        break;
                    }
                    let value = read_cstring(&mut body)?;
                    parameters.push((key, value));
                }
                Ok(Some(StartupRequest::Startup { parameters }))
            }
            SSL_REQUEST_CODE => Ok(Some(StartupRequest::SslRequest)),
            GSSENC_REQUEST_CODE => Ok(Some(StartupRequest::GssEncRequest)),
            CANCEL_REQUEST_CODE => {
                ensure_remaining(&body, 8, "CancelRequest")?;
                let process_id = body.get_i32();
                let secret_key = body.get_i32();
                Ok(Some(StartupRequest::CancelRequest {
                    process_id,
                    secret_key,
                }))
            }
            other => Err(PgError::UnsupportedProtocolVersion(other)),
        }
    }

    /// Append the packet to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        let start = buf.len();

        // Placeholder for length (will be filled in at the end)
        buf.put_i32(0);

        match self {
            StartupRequest::Startup { parameters } => {
                buf.put_i32(PROTOCOL_VERSION);
                for (key, value) in parameters {
                    buf.put_slice(key.as_bytes());
                    buf.put_u8(0);
                    buf.put_slice(value.as_bytes());
                    buf.put_u8(0);
                }
                // Terminator
                buf.put_u8(0);
            }
            StartupRequest::SslRequest => buf.put_i32(SSL_REQUEST_CODE),
            StartupRequest::GssEncRequest => buf.put_i32(GSSENC_REQUEST_CODE),
            StartupRequest::CancelRequest {
                process_id,
                secret_key,
            } => {
                buf.put_i32(CANCEL_REQUEST_CODE);
                buf.put_i32(*process_id);
                buf.put_i32(*secret_key);
            }
        }

        // Fill in length (includes length field itself)
        let len = (buf.len() - start) as i32;
        buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
    }
}

// ============================================================================
// Frontend (Client -> Server) Messages
// ============================================================================

/// Frontend messages understood after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// Simple query ('Q')
    Query(String),
    /// Sync ('S')
    Sync,
    /// Terminate ('X')
    Terminate,
    /// Anything else; kept so the caller can log it.
    Unknown { tag: u8, payload: Bytes },
}

impl FrontendMessage {
    /// Split one frontend message off the front of `buf`.
    pub fn decode(buf: &mut BytesMut, max_len: usize) -> PgResult<Option<Self>> {
        Ok(RawMessage::decode(buf, Origin::Frontend, max_len)?.map(Self::from_raw))
    }

    pub fn from_raw(raw: RawMessage) -> Self {
        match raw.tag {
            b'Q' => {
                // Text stops at the first NUL even if the client sent more.
                let end = raw
                    .payload
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(raw.payload.len());
                let text = String::from_utf8_lossy(&raw.payload[..end]).into_owned();
                FrontendMessage::Query(text)
            }
            b'S' => FrontendMessage::Sync,
            b'X' => FrontendMessage::Terminate,
            tag => FrontendMessage::Unknown {
                tag,
                payload: raw.payload,
            },
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            FrontendMessage::Query(_) => b'Q',
            FrontendMessage::Sync => b'S',
            FrontendMessage::Terminate => b'X',
            FrontendMessage::Unknown { tag, .. } => *tag,
        }
    }

    pub fn to_raw(&self) -> RawMessage {
        match self {
            FrontendMessage::Query(text) => RawMessage::new(b'Q', Bytes::copy_from_slice(text.as_bytes())),
            FrontendMessage::Sync => RawMessage::new(b'S', Bytes::new()),
            FrontendMessage::Terminate => RawMessage::new(b'X', Bytes::new()),
            FrontendMessage::Unknown { tag, payload } => RawMessage::new(*tag, payload.clone()),
        }
    }

    /// Append the framed message to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.to_raw().encode(Origin::Frontend, buf);
    }
}

// ============================================================================
// Backend (Server -> Client) Messages
// ============================================================================

/// Field description in a RowDescription message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: i32,
    pub column_attr: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: Format,
}

impl FieldDescription {
    /// A text-format column with no backing catalog entry.
    pub fn text(name: impl Into<String>, column_attr: i16, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            table_oid: 0,
            column_attr,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format: Format::Text,
        }
    }
}

/// Backend message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    AuthenticationOk,
    ParameterStatus {
        name: String,
        value: String,
    },
    BackendKeyData {
        process_id: i32,
        secret_key: i32,
    },
    ReadyForQuery {
        status: TransactionStatus,
    },
    RowDescription {
        fields: Vec<FieldDescription>,
    },
    DataRow {
        values: Vec<Option<Bytes>>,
    },
    CommandComplete {
        tag: String,
    },
    EmptyQueryResponse,
    ErrorResponse {
        severity: String,
        code: String,
        message: String,
    },
}

impl BackendMessage {
    /// ReadyForQuery(Idle), the only status this server reports.
    pub fn ready() -> Self {
        BackendMessage::ReadyForQuery {
            status: TransactionStatus::Idle,
        }
    }

    pub fn command_complete(tag: impl Into<String>) -> Self {
        BackendMessage::CommandComplete { tag: tag.into() }
    }

    pub fn error(severity: Severity, code: SqlState, message: impl Into<String>) -> Self {
        BackendMessage::ErrorResponse {
            severity: severity.as_str().to_string(),
            code: code.code().to_string(),
            message: message.into(),
        }
    }

    pub fn to_raw(&self) -> RawMessage {
        let mut body = BytesMut::new();

        let tag = match self {
            BackendMessage::AuthenticationOk => {
                body.put_i32(0);
                b'R'
            }
            BackendMessage::ParameterStatus { name, value } => {
                put_cstring(&mut body, name);
                put_cstring(&mut body, value);
                b'S'
            }
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                body.put_i32(*process_id);
                body.put_i32(*secret_key);
                b'K'
            }
            BackendMessage::ReadyForQuery { status } => {
                body.put_u8(status.as_byte());
                b'Z'
            }
            BackendMessage::RowDescription { fields } => {
                body.put_i16(fields.len() as i16);
                for field in fields {
                    put_cstring(&mut body, &field.name);
                    body.put_i32(field.table_oid);
                    body.put_i16(field.column_attr);
                    body.put_i32(field.type_oid.as_i32());
                    body.put_i16(field.type_size);
                    body.put_i32(field.type_modifier);
                    body.put_i16(field.format as i16);
                }
                b'T'
            }
            BackendMessage::DataRow { values } => {
                body.put_i16(values.len() as i16);
                for value in values {
                    match value {
                        Some(data) => {
                            body.put_i32(data.len() as i32);
                            body.put_slice(data);
                        }
                        None => body.put_i32(-1),
                    }
                }
                b'D'
            }
            BackendMessage::CommandComplete { tag } => {
                // The NUL comes from the framing trailer.
                body.put_slice(tag.as_bytes());
                b'C'
            }
            BackendMessage::EmptyQueryResponse => b'I',
            BackendMessage::ErrorResponse {
                severity,
                code,
                message,
            } => {
                body.put_u8(b'S');
                put_cstring(&mut body, severity);
                body.put_u8(b'V');
                put_cstring(&mut body, severity);
                body.put_u8(b'C');
                put_cstring(&mut body, code);
                body.put_u8(b'M');
                put_cstring(&mut body, message);
                // The field-list terminator comes from the framing trailer.
                b'E'
            }
        };

        RawMessage::new(tag, body.freeze())
    }

    /// Append the framed message to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.to_raw().encode(Origin::Backend, buf);
    }

    /// Split one backend message off the front of `buf`.
    pub fn decode(buf: &mut BytesMut) -> PgResult<Option<Self>> {
        match RawMessage::decode(buf, Origin::Backend, usize::MAX)? {
            Some(raw) => Self::from_raw(raw).map(Some),
            None => Ok(None),
        }
    }

    pub fn from_raw(raw: RawMessage) -> PgResult<Self> {
        let mut body = raw.payload;

        match raw.tag {
            b'R' => {
                ensure_remaining(&body, 4, "Authentication")?;
                match body.get_i32() {
                    0 => Ok(BackendMessage::AuthenticationOk),
                    other => Err(PgError::Protocol(format!(
                        "Unknown authentication type: {}",
                        other
                    ))),
                }
            }
            b'S' => {
                let name = read_cstring(&mut body)?;
                let value = read_cstring(&mut body)?;
                Ok(BackendMessage::ParameterStatus { name, value })
            }
            b'K' => {
                ensure_remaining(&body, 8, "BackendKeyData")?;
                let process_id = body.get_i32();
                let secret_key = body.get_i32();
                Ok(BackendMessage::BackendKeyData {
                    process_id,
                    secret_key,
                })
            }
            b'Z' => {
                ensure_remaining(&body, 1, "ReadyForQuery")?;
                let status = TransactionStatus::from(body.get_u8());
                Ok(BackendMessage::ReadyForQuery { status })
            }
            b'T' => Self::decode_row_description(body),
            b'D' => Self::decode_data_row(body),
            b'C' => Ok(BackendMessage::CommandComplete {
                tag: String::from_utf8_lossy(&body).into_owned(),
            }),
            b'I' => Ok(BackendMessage::EmptyQueryResponse),
            b'E' => {
                let fields = read_error_fields(body)?;
                Ok(BackendMessage::ErrorResponse {
                    severity: fields.get(&b'S').cloned().unwrap_or_default(),
                    code: fields.get(&b'C').cloned().unwrap_or_default(),
                    message: fields.get(&b'M').cloned().unwrap_or_default(),
                })
            }
            other => Err(PgError::Protocol(format!(
                "Unknown message type: {}",
                other as char
            ))),
        }
    }

    fn decode_row_description(mut body: Bytes) -> PgResult<Self> {
        ensure_remaining(&body, 2, "RowDescription")?;
        let num_fields = body.get_i16().max(0) as usize;
        let mut fields = Vec::with_capacity(num_fields);

        for _ in 0..num_fields {
            let name = read_cstring(&mut body)?;
            ensure_remaining(&body, 18, "RowDescription field")?;
            let table_oid = body.get_i32();
            let column_attr = body.get_i16();
            let type_oid = Oid::from_i32(body.get_i32());
            let type_size = body.get_i16();
            let type_modifier = body.get_i32();
            let format = if body.get_i16() == 0 {
                Format::Text
            } else {
                Format::Binary
            };

            fields.push(FieldDescription {
                name,
                table_oid,
                column_attr,
                type_oid,
                type_size,
                type_modifier,
                format,
            });
        }

        Ok(BackendMessage::RowDescription { fields })
    }

    fn decode_data_row(mut body: Bytes) -> PgResult<Self> {
        ensure_remaining(&body, 2, "DataRow")?;
        let num_cols = body.get_i16().max(0) as usize;
        let mut values = Vec::with_capacity(num_cols);

        for _ in 0..num_cols {
            ensure_remaining(&body, 4, "DataRow value length")?;
            let len = body.get_i32();
            if len < 0 {
                values.push(None);
            } else {
                ensure_remaining(&body, len as usize, "DataRow value")?;
                values.push(Some(body.split_to(len as usize)));
            }
        }

        Ok(BackendMessage::DataRow { values })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn put_cstring(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn ensure_remaining(buf: &Bytes, needed: usize, what: &str) -> PgResult<()> {
    if buf.remaining() < needed {
        return Err(PgError::Protocol(format!("Truncated {} message", what)));
    }
    Ok(())
}

/// Read a null-terminated string from the buffer.
/// Tries direct UTF-8 first, falls back to lossy only if invalid.
fn read_cstring(buf: &mut Bytes) -> PgResult<String> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| PgError::Protocol("Missing null terminator in string".to_string()))?;

    let s = std::str::from_utf8(&buf[..end])
        .map(|s| s.to_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&buf[..end]).into_owned());

    buf.advance(end + 1); // Skip the null terminator
    Ok(s)
}

/// Read error/notice response fields
fn read_error_fields(mut body: Bytes) -> PgResult<HashMap<u8, String>> {
    let mut fields = HashMap::new();

    while body.remaining() > 0 {
        let field_type = body.get_u8();
        if field_type == 0 {
            break;
        }
        let value = read_cstring(&mut body)?;
        fields.insert(field_type, value);
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailer_depends_on_direction() {
        assert_eq!(Origin::Backend.trailer_len(b'C'), 1);
        assert_eq!(Origin::Backend.trailer_len(b'E'), 1);
        assert_eq!(Origin::Backend.trailer_len(b'S'), 0);
        assert_eq!(Origin::Frontend.trailer_len(b'Q'), 1);
        assert_eq!(Origin::Frontend.trailer_len(b'E'), 0);
        assert_eq!(Origin::Frontend.trailer_len(b'S'), 0);
    }

    #[test]
    fn test_query_message_structure() {
        let mut encoded = BytesMut::new();
        FrontendMessage::Query("SELECT 1".to_string()).encode(&mut encoded);

        assert_eq!(encoded[0], b'Q');

        let len = i32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]);
        assert_eq!(len as usize, encoded.len() - 1); // -1 for message type
        assert_eq!(encoded[encoded.len() - 1], 0);
    }
}
