use shardgate_core::StatementShape;

use crate::messages::{
    ResponsePacket, CHARSET_UTF8_GENERAL_CI, MYSQL_TYPE_VARCHAR, PLACEHOLDER_COLUMN_LENGTH,
    SERVER_STATUS_AUTOCOMMIT,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedPacket {
    pub sequence_id: u8,
    pub packet: ResponsePacket,
}

/// One outbound response: packets tagged with contiguous, strictly increasing
/// sequence ids starting one past the inbound frame's id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSequence {
    pub packets: Vec<SequencedPacket>,
}

struct Sequencer {
    next: u8,
}

impl Sequencer {
    fn new(inbound_sequence_id: u8) -> Self {
        Self {
            next: inbound_sequence_id.wrapping_add(1),
        }
    }

    fn tag(&mut self, packet: ResponsePacket) -> SequencedPacket {
        let sequence_id = self.next;
        self.next = self.next.wrapping_add(1);
        SequencedPacket {
            sequence_id,
            packet,
        }
    }
}

/// Assemble the COM_STMT_PREPARE response: the acknowledgement, one generic
/// placeholder definition per parameter, and a terminating EOF when any
/// parameters exist. Result-set definitions are not produced here.
pub fn build_prepare_response(
    inbound_sequence_id: u8,
    statement_id: u32,
    shape: &StatementShape,
    logic_schema: &str,
) -> ResponseSequence {
    let mut seq = Sequencer::new(inbound_sequence_id);
    let mut packets = Vec::with_capacity(2 + shape.parameter_count as usize);
    packets.push(seq.tag(ResponsePacket::PrepareOk {
        statement_id,
        column_count: shape.result_column_count,
        parameter_count: shape.parameter_count,
        warnings: 0,
    }));
    for _ in 0..shape.parameter_count {
        packets.push(seq.tag(ResponsePacket::ColumnDefinition {
            schema: logic_schema.to_string(),
            table: shape.target_table.clone().unwrap_or_default(),
            org_table: String::new(),
            name: String::new(),
            org_name: String::new(),
            charset: CHARSET_UTF8_GENERAL_CI,
            column_length: PLACEHOLDER_COLUMN_LENGTH,
            column_type: MYSQL_TYPE_VARCHAR,
            flags: 0,
            decimals: 0,
        }));
    }
    if shape.parameter_count > 0 {
        packets.push(seq.tag(ResponsePacket::Eof {
            warnings: 0,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
        }));
    }
    ResponseSequence { packets }
}

pub fn build_ok_response(inbound_sequence_id: u8) -> ResponseSequence {
    let mut seq = Sequencer::new(inbound_sequence_id);
    ResponseSequence {
        packets: vec![seq.tag(ResponsePacket::Ok {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            warnings: 0,
        })],
    }
}

pub fn build_error_response(
    inbound_sequence_id: u8,
    code: u16,
    sql_state: &str,
    message: String,
) -> ResponseSequence {
    let mut seq = Sequencer::new(inbound_sequence_id);
    ResponseSequence {
        packets: vec![seq.tag(ResponsePacket::Err {
            code,
            sql_state: sql_state.to_string(),
            message,
        })],
    }
}
