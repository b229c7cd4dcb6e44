use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read};

/// Marks the start of every frame header on the wire.
pub const SYNC_PATTERN: [u8; 8] = [0x02, 0x01, 0x04, 0x03, 0x06, 0x05, 0x08, 0x07];

/// Blocking byte-stream read primitive.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning early only when the source
    /// times out or is exhausted. `Ok(0)` means nothing arrived in time.
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read + ?Sized> ByteSource for R {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    break
                }
                Err(err) if filled > 0 => {
                    trace!("read error after {} bytes: {}", filled, err);
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

/// What happens to the seven bytes read after a false sync start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResyncPolicy {
    /// Drop them unexamined; a pattern starting inside them is missed.
    #[default]
    Reference,
    /// Feed them back into the search so an overlapping pattern is found.
    Rescan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// Full header (sync pattern included); `None` on timeout or closed port.
    pub header: Option<Vec<u8>>,
    pub bytes_consumed: usize,
    pub discarded_bytes: usize,
}

impl SyncResult {
    fn timed_out(discarded_bytes: usize) -> Self {
        Self {
            header: None,
            bytes_consumed: 0,
            discarded_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Searching,
    Matching,
    HeaderRead,
}

/// Recovers frame headers from an unframed byte stream.
pub struct FrameSynchronizer {
    header_length: usize,
    policy: ResyncPolicy,
    pending: VecDeque<u8>,
}

impl FrameSynchronizer {
    /// `header_length` includes the sync pattern and is never shorter than it.
    pub fn new(header_length: usize, policy: ResyncPolicy) -> Self {
        Self {
            header_length: header_length.max(SYNC_PATTERN.len()),
            policy,
            pending: VecDeque::new(),
        }
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    /// Scans until a complete header is read or a read returns nothing.
    pub fn find_header<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> SyncResult {
        let sync_len = SYNC_PATTERN.len();
        let mut discarded = 0usize;
        let mut header = Vec::with_capacity(self.header_length);
        let mut state = ScanState::Searching;

        loop {
            match state {
                ScanState::Searching => {
                    let mut byte = [0u8; 1];
                    if self.read(source, &mut byte) == 0 {
                        return SyncResult::timed_out(discarded);
                    }
                    if byte[0] == SYNC_PATTERN[0] {
                        header.clear();
                        header.push(byte[0]);
                        state = ScanState::Matching;
                    } else {
                        discarded += 1;
                    }
                }
                ScanState::Matching => {
                    let mut rest = [0u8; 7];
                    let read = self.read(source, &mut rest);
                    if read < rest.len() {
                        discarded += 1 + read;
                        if read == 0 {
                            return SyncResult::timed_out(discarded);
                        }
                        state = ScanState::Searching;
                        continue;
                    }
                    header.extend_from_slice(&rest);
                    if header[..] == SYNC_PATTERN {
                        state = ScanState::HeaderRead;
                    } else {
                        discarded += 1;
                        if self.policy == ResyncPolicy::Rescan {
                            for &b in rest.iter().rev() {
                                self.pending.push_front(b);
                            }
                        }
                        trace!("sync mismatch, {} bytes discarded so far", discarded);
                        state = ScanState::Searching;
                    }
                }
                ScanState::HeaderRead => {
                    let remaining = self.header_length - sync_len;
                    let mut rest = vec![0u8; remaining];
                    let read = self.read(source, &mut rest);
                    if read == remaining {
                        header.extend_from_slice(&rest);
                        return SyncResult {
                            header: Some(header),
                            bytes_consumed: self.header_length,
                            discarded_bytes: discarded,
                        };
                    }
                    discarded += sync_len + read;
                    if read == 0 {
                        return SyncResult::timed_out(discarded);
                    }
                    state = ScanState::Searching;
                }
            }
        }
    }

    fn read<S: ByteSource + ?Sized>(&mut self, source: &mut S, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            match self.pending.pop_front() {
                Some(byte) => {
                    buf[filled] = byte;
                    filled += 1;
                }
                None => break,
            }
        }
        if filled < buf.len() {
            match source.read_bytes(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(err) => warn!("serial read failed: {}", err),
            }
        }
        filled
    }
}
