use bytes::{BufMut, BytesMut};
use shardgate_core::ShardgateError;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::messages::{ResponsePacket, EOF_HEADER, ERR_HEADER, OK_HEADER};
use crate::sequence::ResponseSequence;

impl ResponsePacket {
    /// Encode this packet as a complete frame, header included.
    pub fn encode(&self, sequence_id: u8) -> BytesMut {
        let payload = self.encode_payload();
        let mut frame = BytesMut::with_capacity(payload.len() + 4);
        frame.put_uint_le(payload.len() as u64, 3);
        frame.put_u8(sequence_id);
        frame.extend_from_slice(&payload);
        frame
    }

    fn encode_payload(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        match self {
            ResponsePacket::PrepareOk {
                statement_id,
                column_count,
                parameter_count,
                warnings,
            } => {
                buf.put_u8(OK_HEADER);
                buf.put_u32_le(*statement_id);
                buf.put_u16_le(*column_count);
                buf.put_u16_le(*parameter_count);
                buf.put_u8(0); // reserved filler
                buf.put_u16_le(*warnings);
            }
            ResponsePacket::ColumnDefinition {
                schema,
                table,
                org_table,
                name,
                org_name,
                charset,
                column_length,
                column_type,
                flags,
                decimals,
            } => {
                put_lenenc_str(&mut buf, crate::messages::CATALOG);
                put_lenenc_str(&mut buf, schema);
                put_lenenc_str(&mut buf, table);
                put_lenenc_str(&mut buf, org_table);
                put_lenenc_str(&mut buf, name);
                put_lenenc_str(&mut buf, org_name);
                buf.put_u8(0x0c); // length of the fixed field block
                buf.put_u16_le(*charset);
                buf.put_u32_le(*column_length);
                buf.put_u8(*column_type);
                buf.put_u16_le(*flags);
                buf.put_u8(*decimals);
                buf.put_u16_le(0); // reserved
            }
            ResponsePacket::Eof {
                warnings,
                status_flags,
            } => {
                buf.put_u8(EOF_HEADER);
                buf.put_u16_le(*warnings);
                buf.put_u16_le(*status_flags);
            }
            ResponsePacket::Ok {
                affected_rows,
                last_insert_id,
                status_flags,
                warnings,
            } => {
                buf.put_u8(OK_HEADER);
                put_lenenc_int(&mut buf, *affected_rows);
                put_lenenc_int(&mut buf, *last_insert_id);
                buf.put_u16_le(*status_flags);
                buf.put_u16_le(*warnings);
            }
            ResponsePacket::Err {
                code,
                sql_state,
                message,
            } => {
                buf.put_u8(ERR_HEADER);
                buf.put_u16_le(*code);
                buf.put_u8(b'#');
                // SQLSTATE is a fixed five characters on the wire.
                let mut state = [b' '; 5];
                for (dst, src) in state.iter_mut().zip(sql_state.bytes()) {
                    *dst = src;
                }
                buf.put_slice(&state);
                buf.put_slice(message.as_bytes());
            }
        }
        buf
    }

    /// Decode a frame by payload shape: 0xff is ERR, a short 0xfe is EOF,
    /// 0x00 is OK, anything else is a column definition. The prepare
    /// acknowledgement shares the 0x00 header with OK and cannot be told
    /// apart by shape; use [`ResponsePacket::decode_prepare_ack`] where one
    /// is expected.
    pub fn decode(frame: &[u8]) -> Result<(u8, ResponsePacket), ShardgateError> {
        let (sequence_id, payload) = split_frame(frame)?;
        let packet = match payload {
            [] => {
                return Err(ShardgateError::MalformedFrame(
                    "empty response payload".into(),
                ))
            }
            [ERR_HEADER, ..] => decode_err(payload)?,
            [EOF_HEADER, ..] if payload.len() <= 5 => decode_eof(payload)?,
            [OK_HEADER, ..] => decode_ok(payload)?,
            _ => decode_column_definition(payload)?,
        };
        Ok((sequence_id, packet))
    }

    /// Decode the first packet of a COM_STMT_PREPARE response, which is
    /// either the 12-byte acknowledgement or an ERR.
    pub fn decode_prepare_ack(frame: &[u8]) -> Result<(u8, ResponsePacket), ShardgateError> {
        let (sequence_id, payload) = split_frame(frame)?;
        let packet = match payload {
            [ERR_HEADER, ..] => decode_err(payload)?,
            [OK_HEADER, ..] if payload.len() == 12 => decode_prepare_ok(payload)?,
            _ => {
                return Err(ShardgateError::MalformedFrame(
                    "not a prepare acknowledgement".into(),
                ))
            }
        };
        Ok((sequence_id, packet))
    }
}

fn split_frame(frame: &[u8]) -> Result<(u8, &[u8]), ShardgateError> {
    if frame.len() < 4 {
        return Err(ShardgateError::MalformedFrame(
            "frame shorter than packet header".into(),
        ));
    }
    let len = u32::from_le_bytes([frame[0], frame[1], frame[2], 0]) as usize;
    let sequence_id = frame[3];
    let payload = &frame[4..];
    if payload.len() != len {
        return Err(ShardgateError::MalformedFrame(format!(
            "header says {len} payload bytes, frame carries {}",
            payload.len()
        )));
    }
    Ok((sequence_id, payload))
}

/// Write a raw payload as one frame. Connection-phase packets (handshake
/// greeting and response) have no `ResponsePacket` representation.
pub async fn write_frame<S: AsyncWrite + Unpin>(
    stream: &mut S,
    sequence_id: u8,
    payload: &[u8],
) -> Result<(), ShardgateError> {
    let mut frame = BytesMut::with_capacity(payload.len() + 4);
    frame.put_uint_le(payload.len() as u64, 3);
    frame.put_u8(sequence_id);
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Write one packet to the stream.
pub async fn write_packet<S: AsyncWrite + Unpin>(
    stream: &mut S,
    sequence_id: u8,
    packet: &ResponsePacket,
) -> Result<(), ShardgateError> {
    stream.write_all(&packet.encode(sequence_id)).await?;
    stream.flush().await?;
    Ok(())
}

/// Write a whole response as one buffer so a partial sequence is never
/// visible on the wire.
pub async fn write_sequence<S: AsyncWrite + Unpin>(
    stream: &mut S,
    response: &ResponseSequence,
) -> Result<(), ShardgateError> {
    let mut buf = BytesMut::new();
    for sequenced in &response.packets {
        buf.extend_from_slice(&sequenced.packet.encode(sequenced.sequence_id));
    }
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

fn decode_prepare_ok(payload: &[u8]) -> Result<ResponsePacket, ShardgateError> {
    Ok(ResponsePacket::PrepareOk {
        statement_id: u32::from_le_bytes(payload[1..5].try_into().expect("4 bytes")),
        column_count: u16::from_le_bytes(payload[5..7].try_into().expect("2 bytes")),
        parameter_count: u16::from_le_bytes(payload[7..9].try_into().expect("2 bytes")),
        warnings: u16::from_le_bytes(payload[10..12].try_into().expect("2 bytes")),
    })
}

fn decode_eof(payload: &[u8]) -> Result<ResponsePacket, ShardgateError> {
    if payload.len() != 5 {
        return Err(ShardgateError::MalformedFrame(format!(
            "eof packet has {} bytes, expected 5",
            payload.len()
        )));
    }
    Ok(ResponsePacket::Eof {
        warnings: u16::from_le_bytes(payload[1..3].try_into().expect("2 bytes")),
        status_flags: u16::from_le_bytes(payload[3..5].try_into().expect("2 bytes")),
    })
}

fn decode_ok(payload: &[u8]) -> Result<ResponsePacket, ShardgateError> {
    let mut cursor = 1;
    let affected_rows = get_lenenc_int(payload, &mut cursor)?;
    let last_insert_id = get_lenenc_int(payload, &mut cursor)?;
    let status = take(payload, &mut cursor, 2)?;
    let status_flags = u16::from_le_bytes(status.try_into().expect("2 bytes"));
    let warn = take(payload, &mut cursor, 2)?;
    Ok(ResponsePacket::Ok {
        affected_rows,
        last_insert_id,
        status_flags,
        warnings: u16::from_le_bytes(warn.try_into().expect("2 bytes")),
    })
}

fn decode_err(payload: &[u8]) -> Result<ResponsePacket, ShardgateError> {
    let mut cursor = 1;
    let code_bytes = take(payload, &mut cursor, 2)?;
    let code = u16::from_le_bytes(code_bytes.try_into().expect("2 bytes"));
    let marker = take(payload, &mut cursor, 1)?;
    if marker[0] != b'#' {
        return Err(ShardgateError::MalformedFrame(
            "err packet missing sql state marker".into(),
        ));
    }
    let state = take(payload, &mut cursor, 5)?;
    let sql_state = std::str::from_utf8(state)
        .map_err(|err| ShardgateError::MalformedFrame(format!("sql state not utf-8: {err}")))?
        .to_string();
    let message = std::str::from_utf8(&payload[cursor..])
        .map_err(|err| ShardgateError::MalformedFrame(format!("err message not utf-8: {err}")))?
        .to_string();
    Ok(ResponsePacket::Err {
        code,
        sql_state,
        message,
    })
}

fn decode_column_definition(payload: &[u8]) -> Result<ResponsePacket, ShardgateError> {
    let mut cursor = 0;
    let _catalog = get_lenenc_str(payload, &mut cursor)?;
    let schema = get_lenenc_str(payload, &mut cursor)?;
    let table = get_lenenc_str(payload, &mut cursor)?;
    let org_table = get_lenenc_str(payload, &mut cursor)?;
    let name = get_lenenc_str(payload, &mut cursor)?;
    let org_name = get_lenenc_str(payload, &mut cursor)?;
    let block_len = take(payload, &mut cursor, 1)?;
    if block_len[0] != 0x0c {
        return Err(ShardgateError::MalformedFrame(format!(
            "column definition fixed block length {:#x}, expected 0x0c",
            block_len[0]
        )));
    }
    let charset_bytes = take(payload, &mut cursor, 2)?;
    let charset = u16::from_le_bytes(charset_bytes.try_into().expect("2 bytes"));
    let len_bytes = take(payload, &mut cursor, 4)?;
    let column_length = u32::from_le_bytes(len_bytes.try_into().expect("4 bytes"));
    let column_type = take(payload, &mut cursor, 1)?[0];
    let flag_bytes = take(payload, &mut cursor, 2)?;
    let flags = u16::from_le_bytes(flag_bytes.try_into().expect("2 bytes"));
    let decimals = take(payload, &mut cursor, 1)?[0];
    take(payload, &mut cursor, 2)?; // reserved
    Ok(ResponsePacket::ColumnDefinition {
        schema,
        table,
        org_table,
        name,
        org_name,
        charset,
        column_length,
        column_type,
        flags,
        decimals,
    })
}

fn put_lenenc_str(buf: &mut BytesMut, value: &str) {
    put_lenenc_int(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

fn put_lenenc_int(buf: &mut BytesMut, value: u64) {
    match value {
        0..=0xfa => buf.put_u8(value as u8),
        0xfb..=0xffff => {
            buf.put_u8(0xfc);
            buf.put_u16_le(value as u16);
        }
        0x1_0000..=0xff_ffff => {
            buf.put_u8(0xfd);
            buf.put_uint_le(value, 3);
        }
        _ => {
            buf.put_u8(0xfe);
            buf.put_u64_le(value);
        }
    }
}

fn get_lenenc_int(payload: &[u8], cursor: &mut usize) -> Result<u64, ShardgateError> {
    let first = take(payload, cursor, 1)?[0];
    match first {
        0..=0xfa => Ok(first as u64),
        0xfc => {
            let bytes = take(payload, cursor, 2)?;
            Ok(u16::from_le_bytes(bytes.try_into().expect("2 bytes")) as u64)
        }
        0xfd => {
            let bytes = take(payload, cursor, 3)?;
            Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) as u64)
        }
        0xfe => {
            let bytes = take(payload, cursor, 8)?;
            Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
        }
        other => Err(ShardgateError::MalformedFrame(format!(
            "invalid length-encoded integer prefix {other:#x}"
        ))),
    }
}

fn get_lenenc_str(payload: &[u8], cursor: &mut usize) -> Result<String, ShardgateError> {
    let len = get_lenenc_int(payload, cursor)? as usize;
    let bytes = take(payload, cursor, len)?;
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| ShardgateError::MalformedFrame(format!("string not utf-8: {err}")))
}

fn take<'a>(
    payload: &'a [u8],
    cursor: &mut usize,
    n: usize,
) -> Result<&'a [u8], ShardgateError> {
    let end = cursor
        .checked_add(n)
        .filter(|end| *end <= payload.len())
        .ok_or_else(|| ShardgateError::MalformedFrame("packet truncated".into()))?;
    let slice = &payload[*cursor..end];
    *cursor = end;
    Ok(slice)
}
