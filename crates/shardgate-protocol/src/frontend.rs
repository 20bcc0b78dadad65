use bytes::BytesMut;
use shardgate_core::ShardgateError;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::messages::{
    Command, CommandFrame, COM_INIT_DB, COM_PING, COM_QUERY, COM_QUIT, COM_STMT_CLOSE,
    COM_STMT_EXECUTE, COM_STMT_PREPARE,
};

/// Read one length-framed packet: 3-byte little-endian payload length plus a
/// 1-byte sequence id, then the payload itself.
pub async fn read_frame<S: AsyncRead + Unpin>(
    stream: &mut S,
) -> Result<(u8, BytesMut), ShardgateError> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let sequence_id = header[3];
    let mut payload = BytesMut::zeroed(len);
    stream
        .read_exact(&mut payload)
        .await
        .map_err(|err| ShardgateError::MalformedFrame(format!("truncated frame: {err}")))?;
    Ok((sequence_id, payload))
}

/// Decode a command frame payload into its typed form.
pub fn decode_command(sequence_id: u8, payload: &[u8]) -> Result<CommandFrame, ShardgateError> {
    let (&tag, rest) = payload
        .split_first()
        .ok_or_else(|| ShardgateError::MalformedFrame("empty command frame".into()))?;
    let command = match tag {
        // string<EOF>: the SQL text fills the remainder of the frame.
        COM_STMT_PREPARE => Command::StmtPrepare {
            sql: utf8_payload(rest)?.to_string(),
        },
        COM_STMT_EXECUTE => Command::StmtExecute {
            statement_id: statement_id(rest)?,
        },
        COM_STMT_CLOSE => Command::StmtClose {
            statement_id: statement_id(rest)?,
        },
        COM_INIT_DB => Command::InitDb {
            schema: utf8_payload(rest)?.trim_end_matches('\0').to_string(),
        },
        COM_QUERY => Command::Query {
            sql: utf8_payload(rest)?.to_string(),
        },
        COM_PING => Command::Ping,
        COM_QUIT => Command::Quit,
        other => Command::Unsupported { tag: other },
    };
    Ok(CommandFrame {
        sequence_id,
        command,
    })
}

fn utf8_payload(payload: &[u8]) -> Result<&str, ShardgateError> {
    std::str::from_utf8(payload)
        .map_err(|err| ShardgateError::Decoding(format!("command payload is not utf-8: {err}")))
}

fn statement_id(payload: &[u8]) -> Result<u32, ShardgateError> {
    let bytes: [u8; 4] = payload
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            ShardgateError::MalformedFrame("statement id field shorter than 4 bytes".into())
        })?;
    Ok(u32::from_le_bytes(bytes))
}
