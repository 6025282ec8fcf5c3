pub mod registry;
pub mod transport;
pub mod wire;

pub use registry::{Tool, ToolRegistry};
pub use wire::{JsonRpcRequest, JsonRpcResponse, RpcId};
