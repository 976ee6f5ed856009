//! Core data model, error taxonomy, cancellation token, and JSON-RPC wire types
//! shared by every other crate in the workspace.

pub mod cancel;
pub mod error;
pub mod rpc;
pub mod types;

pub use cancel::CancelToken;
pub use error::{Error, PathSecurityReason, Result};
pub use rpc::{RpcErrorBody, RpcId, RpcRequest, RpcResponse};
pub use types::*;
