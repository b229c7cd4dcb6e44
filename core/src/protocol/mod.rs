pub mod body;
pub mod header;
pub mod sync;
pub mod template;

pub use body::SkipBodyDecoder;
pub use header::{frame_header_template, FrameHeader};
pub use sync::{ByteSource, FrameSynchronizer, ResyncPolicy, SyncResult, SYNC_PATTERN};
pub use template::{DecodedStruct, FieldValue, FormatCode, StructTemplate};
