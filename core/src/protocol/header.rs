use crate::prelude::{DecodeError, DecodeResult};
use crate::protocol::template::{DecodedStruct, FormatCode, StructTemplate};

/// Largest `totalPacketLen` accepted; anything above is treated as a corrupt header.
pub const MAX_PACKET_LEN: usize = 128 * 1024;

/// Layout of the frame header that follows (and includes) the sync pattern.
pub fn frame_header_template() -> StructTemplate {
    StructTemplate::new()
        .field("magicWord", FormatCode::U64)
        .field("version", FormatCode::U32)
        .field("totalPacketLen", FormatCode::U32)
        .field("platform", FormatCode::U32)
        .field("frameNumber", FormatCode::U32)
        .field("timeCpuCycles", FormatCode::U32)
        .field("numDetectedObj", FormatCode::U32)
        .field("numTLVs", FormatCode::U32)
        .field("subFrameNumber", FormatCode::U32)
}

/// A verified header: the raw bytes as received plus their decoded fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeader {
    raw: Vec<u8>,
    fields: DecodedStruct,
}

impl FrameHeader {
    pub fn parse(raw: Vec<u8>, template: &StructTemplate) -> DecodeResult<Self> {
        let fields = template.decode(&raw)?;
        Ok(Self { raw, fields })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn fields(&self) -> &DecodedStruct {
        &self.fields
    }

    pub fn into_fields(self) -> DecodedStruct {
        self.fields
    }

    fn unsigned(&self, name: &'static str) -> DecodeResult<u64> {
        self.fields
            .get(name)
            .and_then(|value| value.as_u64())
            .ok_or(DecodeError::MissingField(name))
    }

    pub fn frame_number(&self) -> DecodeResult<u64> {
        self.unsigned("frameNumber")
    }

    pub fn total_packet_len(&self) -> DecodeResult<usize> {
        Ok(self.unsigned("totalPacketLen")? as usize)
    }

    pub fn num_detected_obj(&self) -> DecodeResult<usize> {
        Ok(self.unsigned("numDetectedObj")? as usize)
    }

    pub fn num_tlvs(&self) -> DecodeResult<usize> {
        Ok(self.unsigned("numTLVs")? as usize)
    }

    /// Number of bytes that follow the header within the packet.
    pub fn payload_len(&self) -> DecodeResult<usize> {
        let packet = self.total_packet_len()?;
        if packet > MAX_PACKET_LEN {
            return Err(DecodeError::OversizedPacket {
                packet,
                limit: MAX_PACKET_LEN,
            });
        }
        packet
            .checked_sub(self.raw.len())
            .ok_or(DecodeError::InvalidPacketLength {
                packet,
                header: self.raw.len(),
            })
    }
}

#[cfg(test)]
pub(crate) fn encode_header(frame_number: u32, total_packet_len: u32, num_obj: u32) -> Vec<u8> {
    let mut bytes = crate::protocol::sync::SYNC_PATTERN.to_vec();
    for value in [0x0301_0000u32, total_packet_len, 0x1432, frame_number, 0, num_obj, 0, 0] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}
