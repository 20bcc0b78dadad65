#[cfg(test)]
mod tests {
    use crate::backend::{write_packet, write_sequence};
    use crate::frontend::{decode_command, read_frame};
    use crate::messages::{
        Command, ResponsePacket, COM_STMT_EXECUTE, COM_STMT_PREPARE, MYSQL_TYPE_VARCHAR,
    };
    use crate::sequence::{build_error_response, build_ok_response, build_prepare_response};
    use shardgate_core::{ShardgateError, StatementKind, StatementShape};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn shape(parameter_count: u16, result_column_count: u16) -> StatementShape {
        StatementShape {
            kind: StatementKind::Select,
            parameter_count,
            result_column_count,
            target_table: Some("t".into()),
        }
    }

    fn command_frame(sequence_id: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
        frame.push(sequence_id);
        frame.extend_from_slice(payload);
        frame
    }

    #[tokio::test]
    async fn read_frame_and_decode_prepare() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let mut payload = vec![COM_STMT_PREPARE];
        payload.extend_from_slice(b"SELECT a FROM t WHERE id = ?");
        client
            .write_all(&command_frame(0, &payload))
            .await
            .expect("write");

        let (sequence_id, bytes) = read_frame(&mut server).await.expect("frame");
        assert_eq!(sequence_id, 0);
        let frame = decode_command(sequence_id, &bytes).expect("decode");
        assert_eq!(
            frame.command,
            Command::StmtPrepare {
                sql: "SELECT a FROM t WHERE id = ?".into()
            }
        );
    }

    #[tokio::test]
    async fn truncated_frame_is_malformed() {
        let (mut client, mut server) = tokio::io::duplex(256);
        // Header promises 10 payload bytes but only 3 arrive before EOF.
        client.write_all(&[10, 0, 0, 0, 1, 2, 3]).await.expect("write");
        drop(client);
        let err = read_frame(&mut server).await.expect_err("must fail");
        assert!(matches!(err, ShardgateError::MalformedFrame(_)));
    }

    #[test]
    fn invalid_utf8_sql_is_a_decoding_error() {
        let payload = [COM_STMT_PREPARE, 0xff, 0xfe];
        let err = decode_command(0, &payload).expect_err("must fail");
        assert!(matches!(err, ShardgateError::Decoding(_)));
    }

    #[test]
    fn short_execute_payload_is_malformed() {
        let payload = [COM_STMT_EXECUTE, 0x01, 0x00];
        let err = decode_command(0, &payload).expect_err("must fail");
        assert!(matches!(err, ShardgateError::MalformedFrame(_)));
    }

    #[test]
    fn empty_command_frame_is_malformed() {
        let err = decode_command(0, &[]).expect_err("must fail");
        assert!(matches!(err, ShardgateError::MalformedFrame(_)));
    }

    #[test]
    fn prepare_ok_round_trip() {
        let packet = ResponsePacket::PrepareOk {
            statement_id: 7,
            column_count: 2,
            parameter_count: 1,
            warnings: 0,
        };
        let frame = packet.encode(1);
        let (sequence_id, decoded) = ResponsePacket::decode_prepare_ack(&frame).expect("decode");
        assert_eq!(sequence_id, 1);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn twelve_byte_ok_payload_stays_an_ok() {
        // 300 (0xfc + 2 bytes) and 70000 (0xfd + 3 bytes) pad the OK payload
        // to exactly 12 bytes, the same size as a prepare acknowledgement.
        let packet = ResponsePacket::Ok {
            affected_rows: 300,
            last_insert_id: 70_000,
            status_flags: 2,
            warnings: 0,
        };
        let (_, decoded) = ResponsePacket::decode(&packet.encode(1)).expect("decode");
        assert!(matches!(decoded, ResponsePacket::Ok { .. }));
        assert_eq!(decoded, packet);
    }

    #[test]
    fn prepare_ack_context_rejects_other_shapes() {
        let frame = ResponsePacket::Eof {
            warnings: 0,
            status_flags: 2,
        }
        .encode(1);
        let err = ResponsePacket::decode_prepare_ack(&frame).expect_err("must fail");
        assert!(matches!(err, ShardgateError::MalformedFrame(_)));
    }

    #[test]
    fn prepare_ack_context_passes_err_through() {
        let packet = ResponsePacket::Err {
            code: 1064,
            sql_state: "42000".into(),
            message: "bad sql".into(),
        };
        let (_, decoded) = ResponsePacket::decode_prepare_ack(&packet.encode(1)).expect("decode");
        assert_eq!(decoded, packet);
    }

    #[test]
    fn column_definition_round_trip() {
        let packet = ResponsePacket::ColumnDefinition {
            schema: "logic_db".into(),
            table: "t_order".into(),
            org_table: String::new(),
            name: String::new(),
            org_name: String::new(),
            charset: 33,
            column_length: 100,
            column_type: MYSQL_TYPE_VARCHAR,
            flags: 0,
            decimals: 0,
        };
        let frame = packet.encode(2);
        let (sequence_id, decoded) = ResponsePacket::decode(&frame).expect("decode");
        assert_eq!(sequence_id, 2);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn eof_round_trip() {
        let packet = ResponsePacket::Eof {
            warnings: 1,
            status_flags: 2,
        };
        let (sequence_id, decoded) = ResponsePacket::decode(&packet.encode(4)).expect("decode");
        assert_eq!(sequence_id, 4);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn err_round_trip() {
        let packet = ResponsePacket::Err {
            code: 1064,
            sql_state: "42000".into(),
            message: "You have an error in your SQL syntax".into(),
        };
        let (sequence_id, decoded) = ResponsePacket::decode(&packet.encode(1)).expect("decode");
        assert_eq!(sequence_id, 1);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut frame = ResponsePacket::Eof {
            warnings: 0,
            status_flags: 0,
        }
        .encode(1)
        .to_vec();
        frame.truncate(frame.len() - 1);
        let err = ResponsePacket::decode(&frame).expect_err("must fail");
        assert!(matches!(err, ShardgateError::MalformedFrame(_)));
    }

    #[test]
    fn prepare_response_sequence_is_contiguous() {
        let response = build_prepare_response(0, 1, &shape(2, 2), "logic_db");
        // ack + one definition per parameter + eof
        assert_eq!(response.packets.len(), 4);
        let ids: Vec<u8> = response.packets.iter().map(|p| p.sequence_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(matches!(
            response.packets[0].packet,
            ResponsePacket::PrepareOk {
                statement_id: 1,
                column_count: 2,
                parameter_count: 2,
                warnings: 0,
            }
        ));
        assert!(matches!(
            response.packets[3].packet,
            ResponsePacket::Eof { .. }
        ));
    }

    #[test]
    fn placeholder_definitions_carry_schema_and_table() {
        let response = build_prepare_response(0, 9, &shape(1, 1), "logic_db");
        match &response.packets[1].packet {
            ResponsePacket::ColumnDefinition {
                schema,
                table,
                name,
                column_type,
                ..
            } => {
                assert_eq!(schema, "logic_db");
                assert_eq!(table, "t");
                assert!(name.is_empty());
                assert_eq!(*column_type, MYSQL_TYPE_VARCHAR);
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn parameterless_prepare_is_a_single_packet() {
        let response = build_prepare_response(0, 3, &shape(0, 1), "logic_db");
        assert_eq!(response.packets.len(), 1);
        assert_eq!(response.packets[0].sequence_id, 1);
        assert!(matches!(
            response.packets[0].packet,
            ResponsePacket::PrepareOk { .. }
        ));
    }

    #[test]
    fn sequence_ids_wrap_at_u8_boundary() {
        let response = build_prepare_response(255, 1, &shape(1, 0), "logic_db");
        let ids: Vec<u8> = response.packets.iter().map(|p| p.sequence_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn error_response_is_one_packet_after_inbound() {
        let response = build_error_response(0, 1064, "42000", "bad sql".into());
        assert_eq!(response.packets.len(), 1);
        assert_eq!(response.packets[0].sequence_id, 1);
    }

    #[tokio::test]
    async fn write_packet_emits_header_then_payload() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let packet = ResponsePacket::PrepareOk {
            statement_id: 1,
            column_count: 0,
            parameter_count: 0,
            warnings: 0,
        };
        write_packet(&mut server, 1, &packet).await.expect("write");
        let mut bytes = [0u8; 16];
        client.read_exact(&mut bytes).await.expect("read");
        // 12-byte payload, sequence 1, status tag 0x00, statement id 1.
        assert_eq!(&bytes[..4], &[12, 0, 0, 1]);
        assert_eq!(bytes[4], 0x00);
        assert_eq!(u32::from_le_bytes(bytes[5..9].try_into().unwrap()), 1);
    }

    #[tokio::test]
    async fn write_sequence_emits_all_packets_in_order() {
        let (mut client, mut server) = tokio::io::duplex(512);
        let response = build_prepare_response(0, 5, &shape(1, 1), "logic_db");
        write_sequence(&mut server, &response).await.expect("write");
        drop(server);
        let mut bytes = Vec::new();
        client.read_to_end(&mut bytes).await.expect("read");

        let mut cursor = 0;
        let mut seen = Vec::new();
        while cursor < bytes.len() {
            let len = u32::from_le_bytes([
                bytes[cursor],
                bytes[cursor + 1],
                bytes[cursor + 2],
                0,
            ]) as usize;
            let frame = &bytes[cursor..cursor + 4 + len];
            let (sequence_id, _) = if seen.is_empty() {
                ResponsePacket::decode_prepare_ack(frame).expect("decode ack")
            } else {
                ResponsePacket::decode(frame).expect("decode")
            };
            seen.push(sequence_id);
            cursor += 4 + len;
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn ok_response_follows_inbound_sequence() {
        let response = build_ok_response(0);
        assert_eq!(response.packets.len(), 1);
        assert_eq!(response.packets[0].sequence_id, 1);
        assert!(matches!(response.packets[0].packet, ResponsePacket::Ok { .. }));
    }
}
