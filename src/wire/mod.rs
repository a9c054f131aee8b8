//! Wire framing: the typed byte cursor, the packet envelope, and the opcode
//! table. Nothing above this module ever touches raw bytes or endianness.

pub mod buffer;
pub mod opcodes;
pub mod packet;

pub use buffer::ByteBuffer;
pub use packet::Packet;
