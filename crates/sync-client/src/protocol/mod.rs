//! Hub wire protocol
//!
//! Frame layout, op codes, close codes, and the binary codec.

mod close_codes;
mod codec;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use codec::{CodecError, HubCodec, COMPRESSION_FLAG_LZ4, COMPRESSION_FLAG_NONE};
pub use messages::{HubMessage, ENCODING_NAME};
pub use opcodes::OpCode;
pub use payloads::{MessageSeverity, ServerMessagePayload, SystemInfoPayload};
