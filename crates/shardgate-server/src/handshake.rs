use bytes::{BufMut, BytesMut};
use shardgate_core::ShardgateError;
use shardgate_protocol::backend::{write_frame, write_packet};
use shardgate_protocol::frontend::read_frame;
use shardgate_protocol::messages::{
    ResponsePacket, CHARSET_UTF8_GENERAL_CI, SERVER_STATUS_AUTOCOMMIT,
};
use tokio::io::{AsyncRead, AsyncWrite};

const PROTOCOL_VERSION: u8 = 10;
const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;
const AUTH_PLUGIN: &str = "mysql_native_password";

/// Connection phase. The proxy sends a HandshakeV10 greeting, accepts the
/// client's response without verifying credentials, and confirms with OK so
/// the session moves on to the command phase.
pub async fn greet<S>(
    stream: &mut S,
    connection_id: u32,
    server_version: &str,
) -> Result<(), ShardgateError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let scramble: [u8; 20] = rand::random();
    let greeting = build_greeting(connection_id, server_version, &scramble);
    write_frame(stream, 0, &greeting).await?;

    let (sequence_id, response) = read_frame(stream).await?;
    // Capability flags, max packet size, charset and the reserved block alone
    // take 32 bytes; anything shorter cannot be a handshake response.
    if response.len() < 32 {
        return Err(ShardgateError::MalformedFrame(
            "handshake response too short".into(),
        ));
    }
    write_packet(
        stream,
        sequence_id.wrapping_add(1),
        &ResponsePacket::Ok {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            warnings: 0,
        },
    )
    .await
}

fn build_greeting(connection_id: u32, server_version: &str, scramble: &[u8; 20]) -> BytesMut {
    let capabilities = CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_PLUGIN_AUTH;
    let mut buf = BytesMut::new();
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_slice(server_version.as_bytes());
    buf.put_u8(0);
    buf.put_u32_le(connection_id);
    buf.put_slice(&scramble[..8]);
    buf.put_u8(0); // filler
    buf.put_u16_le(capabilities as u16);
    buf.put_u8(CHARSET_UTF8_GENERAL_CI as u8);
    buf.put_u16_le(SERVER_STATUS_AUTOCOMMIT);
    buf.put_u16_le((capabilities >> 16) as u16);
    buf.put_u8(21); // length of the full auth plugin data
    buf.put_slice(&[0u8; 10]); // reserved
    buf.put_slice(&scramble[8..]);
    buf.put_u8(0);
    buf.put_slice(AUTH_PLUGIN.as_bytes());
    buf.put_u8(0);
    buf
}
