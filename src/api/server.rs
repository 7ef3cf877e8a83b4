//! API Server Module
//!
//! This module implements a JSON-RPC server over the ledger service.
//! The authenticated caller arrives in the `x-account-id` header, set by the auth proxy
//! in front of this server; methods acting on the caller's own account require it.
//!
//! # Methods
//! - `register` `{ id, publicKey }`
//! - `sendTransaction` `{ message: { recipientId, amount, nonce }, signature }` (caller)
//! - `stake` / `unstake` `{ amount }` (caller)
//! - `getAccount` `{ id? }` (defaults to caller)
//! - `getBlocks` `{ page?, limit? }`
//! - `getTransactions` `{ page?, limit? }` (caller)
//! - `settle`
//! - `verifyChain`
//! - `resumeChain` (caller listed in `[api] operators`, after a halt has been investigated)

use crate::{
    LedgerError, TransferSubmission, config::Config, service::LedgerService, state::AccountStore,
};
use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// Header carrying the authenticated account id
pub const CALLER_HEADER: &str = "x-account-id";

const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const UNAUTHORIZED: i32 = -32001;
const INVALID_SIGNATURE: i32 = -32002;
const NO_VALIDATOR: i32 = -32003;
const CHAIN_HALTED: i32 = -32004;
const REJECTED: i32 = -32000;

/// Shared application state that is accessible across all request handlers
pub struct AppState<S> {
    service: Arc<LedgerService<S>>,
    operators: Arc<[String]>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            operators: self.operators.clone(),
        }
    }
}

/// The main API server struct
pub struct Server<S> {
    config: Config,
    state: AppState<S>,
}

impl<S: AccountStore + 'static> Server<S> {
    /// Creates a new API server over a shared ledger service
    pub fn new(config: Config, service: Arc<LedgerService<S>>) -> Self {
        let operators = config.api.operators.clone().into();
        Self {
            config,
            state: AppState { service, operators },
        }
    }

    /// The router with a single POST endpoint at "/"
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_rpc::<S>))
            .with_state(self.state.clone())
    }

    /// Starts the API server and begins listening for incoming requests
    pub async fn start(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Build the JSON-RPC router for a ledger service
///
/// `operators` are the caller ids allowed to run operator methods.
pub fn router<S: AccountStore + 'static>(
    service: Arc<LedgerService<S>>,
    operators: Vec<String>,
) -> Router {
    Router::new()
        .route("/", post(handle_rpc::<S>))
        .with_state(AppState {
            service,
            operators: operators.into(),
        })
}

/// JSON-RPC 2.0 request structure
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Value,
}

/// JSON-RPC 2.0 response structure
///
/// Either `result` or `error` is populated, never both.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC error object
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    /// Present on errors the caller may retry unchanged
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

type RpcResult = Result<Value, JsonRpcError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterParams {
    id: String,
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct AmountParams {
    amount: u64,
}

#[derive(Debug, Default, Deserialize)]
struct AccountParams {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    10
}

/// Main RPC request handler
///
/// Routes the request to the method handler and wraps its result in a JSON-RPC envelope.
async fn handle_rpc<S: AccountStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    info!("Received RPC request: {}", request.method);
    let caller = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    let service = state.service.as_ref();
    let params = request.params;
    let result = match request.method.as_str() {
        "register" => register(service, params),
        "sendTransaction" => send_transaction(service, caller, params).await,
        "stake" => stake(service, caller, params, true),
        "unstake" => stake(service, caller, params, false),
        "getAccount" => get_account(service, caller, params),
        "getBlocks" => get_blocks(service, params),
        "getTransactions" => get_transactions(service, caller, params).await,
        "settle" => settle(service).await,
        "verifyChain" => Ok(json!({ "valid": service.verify_chain() })),
        "resumeChain" => resume_chain(service, &state.operators, caller),
        _ => Err(rpc_error(METHOD_NOT_FOUND, "Method not found")),
    };

    let (result, error) = match result {
        Ok(value) => (Some(value), None),
        Err(err) => {
            warn!("RPC {} failed: {}", request.method, err.message);
            (None, Some(err))
        }
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        result,
        error,
        id: request.id,
    })
}

fn rpc_error(code: i32, message: impl Into<String>) -> JsonRpcError {
    JsonRpcError {
        code,
        message: message.into(),
        retryable: false,
    }
}

impl From<LedgerError> for JsonRpcError {
    fn from(err: LedgerError) -> Self {
        let code = match &err {
            _ if err.is_chain_halt() => CHAIN_HALTED,
            LedgerError::InvalidSignature => INVALID_SIGNATURE,
            LedgerError::NoValidatorAvailable => NO_VALIDATOR,
            LedgerError::InvalidRequest(_) => INVALID_PARAMS,
            _ => REJECTED,
        };
        JsonRpcError {
            code,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params)
        .map_err(|e| rpc_error(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

fn require_caller(caller: Option<String>) -> Result<String, JsonRpcError> {
    caller.ok_or_else(|| rpc_error(UNAUTHORIZED, "Missing caller identity"))
}

fn to_value<T: Serialize>(value: &T) -> RpcResult {
    serde_json::to_value(value).map_err(|e| rpc_error(REJECTED, e.to_string()))
}

/// Account as presented to clients, with the derived validator flag
fn account_view(account: &crate::Account) -> Value {
    json!({
        "id": account.id,
        "publicKey": account.public_key,
        "balance": account.balance,
        "stakedBalance": account.staked_balance,
        "isValidator": account.is_validator(),
        "nonce": account.nonce,
    })
}

fn register<S: AccountStore>(service: &LedgerService<S>, params: Value) -> RpcResult {
    let params: RegisterParams = parse(params)?;
    let account = service.register(&params.id, &params.public_key)?;
    Ok(account_view(&account))
}

/// Handles the "sendTransaction" RPC method
///
/// 1. Deserializes the submission (strict message schema)
/// 2. Checks the request and signature, pools it
/// 3. Returns the receipt: pending, or the outcome if a round settled it
async fn send_transaction<S: AccountStore>(
    service: &LedgerService<S>,
    caller: Option<String>,
    params: Value,
) -> RpcResult {
    let caller = require_caller(caller)?;
    let submission: TransferSubmission = parse(params)?;
    let receipt = service.submit_transfer(&caller, submission).await?;
    to_value(&receipt)
}

fn stake<S: AccountStore>(
    service: &LedgerService<S>,
    caller: Option<String>,
    params: Value,
    lock: bool,
) -> RpcResult {
    let caller = require_caller(caller)?;
    let AmountParams { amount } = parse(params)?;
    let account = if lock {
        service.stake(&caller, amount)?
    } else {
        service.unstake(&caller, amount)?
    };
    Ok(account_view(&account))
}

fn get_account<S: AccountStore>(
    service: &LedgerService<S>,
    caller: Option<String>,
    params: Value,
) -> RpcResult {
    let params: AccountParams = if params.is_null() { AccountParams::default() } else { parse(params)? };
    let id = match params.id {
        Some(id) => id,
        None => require_caller(caller)?,
    };
    Ok(account_view(&service.account(&id)?))
}

fn page_params(params: Value) -> Result<PageParams, JsonRpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    let params: PageParams = parse(params)?;
    if params.page == 0 || params.limit == 0 {
        return Err(rpc_error(INVALID_PARAMS, "page and limit must be positive"));
    }
    Ok(params)
}

fn get_blocks<S: AccountStore>(service: &LedgerService<S>, params: Value) -> RpcResult {
    let PageParams { page, limit } = page_params(params)?;
    to_value(&service.blocks(page, limit))
}

async fn get_transactions<S: AccountStore>(
    service: &LedgerService<S>,
    caller: Option<String>,
    params: Value,
) -> RpcResult {
    let caller = require_caller(caller)?;
    let PageParams { page, limit } = page_params(params)?;
    to_value(&service.history(&caller, page, limit).await)
}

/// Handles the "resumeChain" RPC method; operators only
fn resume_chain<S: AccountStore>(
    service: &LedgerService<S>,
    operators: &[String],
    caller: Option<String>,
) -> RpcResult {
    let caller = require_caller(caller)?;
    if !operators.contains(&caller) {
        warn!("Refused chain resume from non-operator {}", caller);
        return Err(rpc_error(UNAUTHORIZED, "Caller is not an operator"));
    }
    info!("Chain resume requested by operator {}", caller);
    service.resume_chain();
    Ok(json!({ "halted": false }))
}

async fn settle<S: AccountStore>(service: &LedgerService<S>) -> RpcResult {
    let report = service.settle().await?;
    to_value(&report)
}
