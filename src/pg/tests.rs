//! Tests for the PostgreSQL protocol implementation.

use super::error::*;
use super::protocol::*;
use super::types::*;
use bytes::{Bytes, BytesMut};

fn encode_backend(msg: &BackendMessage) -> BytesMut {
    let mut buf = BytesMut::new();
    msg.encode(&mut buf);
    buf
}

fn declared_length(encoded: &[u8]) -> usize {
    i32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]) as usize
}

// ============================================================================
// Backend Message Encoding Tests
// ============================================================================

mod message_encoding {
    use super::*;

    #[test]
    fn test_authentication_ok_encoding() {
        // AuthenticationOk:
        // - Byte: 'R'
        // - Int32: Length (8)
        // - Int32: Auth type (0 = OK)
        let encoded = encode_backend(&BackendMessage::AuthenticationOk);
        assert_eq!(&encoded[..], &[b'R', 0, 0, 0, 8, 0, 0, 0, 0]);
    }

    #[test]
    fn test_parameter_status_encoding() {
        // ParameterStatus:
        // - Byte: 'S'
        // - Int32: Length
        // - String: name, String: value (both null-terminated, no extra trailer)
        let encoded = encode_backend(&BackendMessage::ParameterStatus {
            name: "TimeZone".to_string(),
            value: "UTC".to_string(),
        });

        assert_eq!(encoded[0], b'S');
        assert_eq!(&encoded[5..], b"TimeZone\0UTC\0");
        assert_eq!(declared_length(&encoded), 4 + 13);
    }

    #[test]
    fn test_backend_key_data_encoding() {
        let encoded = encode_backend(&BackendMessage::BackendKeyData {
            process_id: 12345,
            secret_key: 54321,
        });

        assert_eq!(encoded[0], b'K');
        assert_eq!(declared_length(&encoded), 12);
        assert_eq!(&encoded[5..9], &12345i32.to_be_bytes());
        assert_eq!(&encoded[9..13], &54321i32.to_be_bytes());
    }

    #[test]
    fn test_ready_for_query_encoding() {
        let encoded = encode_backend(&BackendMessage::ready());
        assert_eq!(&encoded[..], &[b'Z', 0, 0, 0, 5, b'I']);
    }

    #[test]
    fn test_command_complete_encoding() {
        // Length = 4 (length field) + 10 ("INSERT 0 1") + 1 (null terminator) = 15
        let encoded = encode_backend(&BackendMessage::command_complete("INSERT 0 1"));

        assert_eq!(encoded[0], b'C');
        assert_eq!(declared_length(&encoded), 15);
        assert_eq!(&encoded[5..], b"INSERT 0 1\0");
    }

    #[test]
    fn test_row_description_encoding() {
        let encoded = encode_backend(&BackendMessage::RowDescription {
            fields: vec![
                FieldDescription::text("id", 1, Oid::INT4),
                FieldDescription::text("name", 2, Oid::TEXT),
            ],
        });

        assert_eq!(encoded[0], b'T');
        // count + ("id\0" + 18) + ("name\0" + 18)
        assert_eq!(declared_length(&encoded), 4 + 2 + (3 + 18) + (5 + 18));

        let body = &encoded[5..];
        assert_eq!(&body[0..2], &2i16.to_be_bytes());
        assert_eq!(&body[2..5], b"id\0");
        assert_eq!(&body[5..9], &0i32.to_be_bytes()); // table oid
        assert_eq!(&body[9..11], &1i16.to_be_bytes()); // attribute number
        assert_eq!(&body[11..15], &23i32.to_be_bytes()); // INT4
        assert_eq!(&body[15..17], &(-1i16).to_be_bytes()); // type size
        assert_eq!(&body[17..21], &(-1i32).to_be_bytes()); // type modifier
        assert_eq!(&body[21..23], &0i16.to_be_bytes()); // text format
    }

    #[test]
    fn test_data_row_encoding() {
        let encoded = encode_backend(&BackendMessage::DataRow {
            values: vec![Some(Bytes::from_static(b"30")), None],
        });

        assert_eq!(encoded[0], b'D');
        let body = &encoded[5..];
        assert_eq!(&body[0..2], &2i16.to_be_bytes());
        assert_eq!(&body[2..6], &2i32.to_be_bytes());
        assert_eq!(&body[6..8], b"30");
        assert_eq!(&body[8..12], &(-1i32).to_be_bytes());
        assert_eq!(body.len(), 12);
    }

    #[test]
    fn test_error_response_encoding() {
        let encoded = encode_backend(&BackendMessage::error(
            Severity::Error,
            SqlState::UNDEFINED_TABLE,
            "no such table: foo",
        ));

        assert_eq!(encoded[0], b'E');
        assert_eq!(
            &encoded[5..],
            &b"SERROR\0VERROR\0C42P01\0Mno such table: foo\0\0"[..]
        );
    }

    #[test]
    fn test_empty_query_response_encoding() {
        let encoded = encode_backend(&BackendMessage::EmptyQueryResponse);
        assert_eq!(&encoded[..], &[b'I', 0, 0, 0, 4]);
    }
}

// ============================================================================
// Framing Tests
// ============================================================================

mod framing {
    use super::*;

    #[test]
    fn test_round_trip_every_backend_kind() {
        let messages = vec![
            BackendMessage::AuthenticationOk,
            BackendMessage::ParameterStatus {
                name: "server_version".to_string(),
                value: "13.3".to_string(),
            },
            BackendMessage::BackendKeyData {
                process_id: 7,
                secret_key: -99,
            },
            BackendMessage::ready(),
            BackendMessage::RowDescription {
                fields: vec![FieldDescription::text("age", 3, Oid::INT4)],
            },
            BackendMessage::DataRow {
                values: vec![None, Some(Bytes::from_static(b"Alice"))],
            },
            BackendMessage::command_complete("SELECT 2"),
            BackendMessage::EmptyQueryResponse,
            BackendMessage::error(Severity::Fatal, SqlState::PROTOCOL_VIOLATION, "bad"),
        ];

        let mut buf = BytesMut::new();
        for msg in &messages {
            msg.encode(&mut buf);
        }

        for expected in &messages {
            let decoded = BackendMessage::decode(&mut buf).unwrap().unwrap();
            assert_eq!(&decoded, expected);
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_invariant() {
        let cases: Vec<(Origin, RawMessage)> = vec![
            (Origin::Backend, BackendMessage::command_complete("DROP").to_raw()),
            (Origin::Backend, BackendMessage::ready().to_raw()),
            (
                Origin::Backend,
                BackendMessage::error(Severity::Error, SqlState::SYNTAX_ERROR, "x").to_raw(),
            ),
            (Origin::Frontend, FrontendMessage::Query("SELECT 1".into()).to_raw()),
            (Origin::Frontend, FrontendMessage::Sync.to_raw()),
            (Origin::Frontend, FrontendMessage::Terminate.to_raw()),
        ];

        for (origin, raw) in cases {
            let mut buf = BytesMut::new();
            raw.encode(origin, &mut buf);
            let trailer = origin.trailer_len(raw.tag);
            assert_eq!(declared_length(&buf), 4 + raw.payload.len() + trailer);
            assert_eq!(buf.len(), 1 + declared_length(&buf));
        }
    }

    #[test]
    fn test_raw_round_trip() {
        for origin in [Origin::Frontend, Origin::Backend] {
            for tag in [b'C', b'Q', b'E', b'S', b'X', b'D'] {
                let raw = RawMessage::new(tag, Bytes::from_static(b"payload"));
                let mut buf = BytesMut::new();
                raw.encode(origin, &mut buf);

                let decoded = RawMessage::decode(&mut buf, origin, usize::MAX)
                    .unwrap()
                    .unwrap();
                assert_eq!(decoded, raw);
            }
        }
    }

    #[test]
    fn test_partial_message_waits_for_more_bytes() {
        let mut full = BytesMut::new();
        FrontendMessage::Query("SELECT * FROM users".to_string()).encode(&mut full);

        let mut buf = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let decoded = FrontendMessage::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
            if i + 1 < full.len() {
                assert!(decoded.is_none(), "decoded early at byte {}", i);
            } else {
                assert_eq!(
                    decoded,
                    Some(FrontendMessage::Query("SELECT * FROM users".to_string()))
                );
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_several_messages_in_one_buffer() {
        let mut buf = BytesMut::new();
        FrontendMessage::Query("SELECT 1".to_string()).encode(&mut buf);
        FrontendMessage::Sync.encode(&mut buf);
        FrontendMessage::Terminate.encode(&mut buf);

        let max = DEFAULT_MAX_MESSAGE_SIZE;
        assert_eq!(
            FrontendMessage::decode(&mut buf, max).unwrap(),
            Some(FrontendMessage::Query("SELECT 1".to_string()))
        );
        assert_eq!(
            FrontendMessage::decode(&mut buf, max).unwrap(),
            Some(FrontendMessage::Sync)
        );
        assert_eq!(
            FrontendMessage::decode(&mut buf, max).unwrap(),
            Some(FrontendMessage::Terminate)
        );
        assert_eq!(FrontendMessage::decode(&mut buf, max).unwrap(), None);
    }

    #[test]
    fn test_length_below_four_is_fatal() {
        let mut buf = BytesMut::from(&[b'Q', 0, 0, 0, 3][..]);
        let err = FrontendMessage::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_oversized_message_is_fatal() {
        let mut buf = BytesMut::from(&[b'Q', 0, 0, 1, 0][..]);
        let err = FrontendMessage::decode(&mut buf, 64).unwrap_err();
        assert!(matches!(err, PgError::MessageTooLarge { len: 256, max: 64 }));
    }

    #[test]
    fn test_query_without_terminator_is_fatal() {
        let mut buf = BytesMut::from(&[b'Q', 0, 0, 0, 6, b'h', b'i'][..]);
        let err = FrontendMessage::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
        assert!(matches!(err, PgError::Protocol(_)));
    }

    #[test]
    fn test_unknown_tag_is_surfaced() {
        // Parse ('P') is not part of the simple query subset.
        let mut buf = BytesMut::from(&[b'P', 0, 0, 0, 6, 0, 0][..]);
        let msg = FrontendMessage::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap()
            .unwrap();
        assert!(matches!(msg, FrontendMessage::Unknown { tag: b'P', .. }));
    }
}

// ============================================================================
// Startup Packet Tests
// ============================================================================

mod startup {
    use super::*;

    #[test]
    fn test_startup_message_decoding() {
        // Startup message format:
        // - Int32: Length (including self)
        // - Int32: Protocol version (196608 = 3.0)
        // - String pairs: parameter name, value (null-terminated)
        // - Byte: 0 (terminator)
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&196608i32.to_be_bytes());
        buf.extend_from_slice(b"user\0alice\0database\0test_db\0\0");
        let len = buf.len() as i32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());

        let request = StartupRequest::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap()
            .unwrap();

        assert_eq!(
            request,
            StartupRequest::Startup {
                parameters: vec![
                    ("user".to_string(), "alice".to_string()),
                    ("database".to_string(), "test_db".to_string()),
                ],
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_startup_round_trip() {
        let requests = vec![
            StartupRequest::Startup {
                parameters: vec![("client_encoding".to_string(), "UTF8".to_string())],
            },
            StartupRequest::SslRequest,
            StartupRequest::GssEncRequest,
            StartupRequest::CancelRequest {
                process_id: 10,
                secret_key: 20,
            },
        ];

        for request in requests {
            let mut buf = BytesMut::new();
            request.encode(&mut buf);

            let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
            assert_eq!(len as usize, buf.len());

            let decoded = StartupRequest::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE)
                .unwrap()
                .unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn test_ssl_request_bytes() {
        let mut buf = BytesMut::from(&[0, 0, 0, 8, 0x04, 0xd2, 0x16, 0x2f][..]);
        let request = StartupRequest::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(request, StartupRequest::SslRequest);
    }

    #[test]
    fn test_unsupported_protocol_version() {
        // Protocol 2.0
        let mut buf = BytesMut::from(&[0, 0, 0, 9, 0, 2, 0, 0, 0][..]);
        let err = StartupRequest::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
        assert!(matches!(err, PgError::UnsupportedProtocolVersion(0x0002_0000)));
        assert_eq!(err.to_string(), "Unsupported protocol version 2.0");
    }

    #[test]
    fn test_partial_startup_waits() {
        let mut full = BytesMut::new();
        StartupRequest::Startup { parameters: vec![] }.encode(&mut full);

        let mut buf = BytesMut::from(&full[..6]);
        assert_eq!(
            StartupRequest::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).unwrap(),
            None
        );
        buf.extend_from_slice(&full[6..]);
        assert_eq!(
            StartupRequest::decode(&mut buf, DEFAULT_MAX_MESSAGE_SIZE).unwrap(),
            Some(StartupRequest::Startup { parameters: vec![] })
        );
    }
}

// ============================================================================
// Backend Message Decoding Tests
// ============================================================================

mod message_decoding {
    use super::*;

    #[test]
    fn test_authentication_ok_decoding() {
        let data: &[u8] = &[b'R', 0, 0, 0, 8, 0, 0, 0, 0];
        let msg = BackendMessage::decode(&mut BytesMut::from(data))
            .unwrap()
            .unwrap();

        assert!(
            matches!(msg, BackendMessage::AuthenticationOk),
            "Should decode as AuthenticationOk"
        );
    }

    #[test]
    fn test_error_response_decoding() {
        let mut data = vec![b'E'];
        let mut body = BytesMut::new();

        // Severity
        body.extend_from_slice(b"SERROR\0");
        // Code
        body.extend_from_slice(b"C42P01\0");
        // Message
        body.extend_from_slice(b"Mrelation \"foo\" does not exist\0");
        // Terminator
        body.extend_from_slice(&[0u8]);

        let length = (body.len() + 4) as i32;
        data.extend_from_slice(&length.to_be_bytes());
        data.extend_from_slice(&body);

        let msg = BackendMessage::decode(&mut BytesMut::from(&data[..]))
            .unwrap()
            .unwrap();

        match msg {
            BackendMessage::ErrorResponse { code, message, .. } => {
                assert_eq!(code, "42P01");
                assert_eq!(message, "relation \"foo\" does not exist");
            }
            _ => panic!("Should decode as ErrorResponse"),
        }
    }

    #[test]
    fn test_truncated_data_row_is_an_error() {
        // Declares one column of 10 bytes but carries only 2.
        let mut data = vec![b'D'];
        let mut body = BytesMut::new();
        body.extend_from_slice(&1i16.to_be_bytes());
        body.extend_from_slice(&10i32.to_be_bytes());
        body.extend_from_slice(b"ab");
        data.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        data.extend_from_slice(&body);

        let err = BackendMessage::decode(&mut BytesMut::from(&data[..])).unwrap_err();
        assert!(matches!(err, PgError::Protocol(_)));
    }
}
