//! JSON-RPC over newline-delimited stdio

pub mod framer;
pub mod message;

pub use framer::{FrameWriter, LineFramer, MAX_FRAME_BYTES};
pub use message::{Incoming, RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION};
