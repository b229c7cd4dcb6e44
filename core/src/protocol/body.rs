use crate::config::RadarParams;
use crate::frame::FrameData;
use crate::prelude::{DecodeError, DecodeResult, FrameBodyDecoder};
use crate::protocol::{ByteSource, FrameHeader};

const DISCARD_CHUNK: usize = 1024;

/// Consumes the frame payload without interpreting it.
///
/// Keeps the stream aligned on packet boundaries and yields header-only
/// frames, so capture and logging work before a TLV decoder is attached.
#[derive(Debug, Default)]
pub struct SkipBodyDecoder;

impl SkipBodyDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameBodyDecoder for SkipBodyDecoder {
    fn decode(
        &mut self,
        header: &FrameHeader,
        port: &mut dyn ByteSource,
        _params: &RadarParams,
    ) -> DecodeResult<FrameData> {
        let expected = header.payload_len()?;
        let mut chunk = [0u8; DISCARD_CHUNK];
        let mut read = 0;
        while read < expected {
            let want = (expected - read).min(DISCARD_CHUNK);
            let got = port.read_bytes(&mut chunk[..want])?;
            read += got;
            if got < want {
                return Err(DecodeError::TruncatedPayload {
                    expected,
                    actual: read,
                });
            }
        }
        Ok(FrameData::from_header(header.fields().clone()))
    }
}
