//! API Module
//!
//! This module handles the JSON-RPC API for submitting transfers, staking, triggering
//! settlement and reading accounts, blocks and history.

mod server;


pub use server::{AppState, CALLER_HEADER, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Server, router};
