/*
[INPUT]:  Fetch tasks (wallet, chain)
[OUTPUT]: Endpoint descriptions: method, path, query params
[POS]:    HTTP layer - Balance API routes
[UPDATE]: When adding new endpoints or changing query parameters
*/

use reqwest::Method;
use serde_json::{Map, Value};

use crate::types::FetchTask;

/// One API call, independent of any session
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub method: Method,
    pub path: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl Endpoint {
    /// GET /token/balance_list?user_addr={wallet}&chain={chain}
    pub fn token_balance_list(wallet: &str, chain: &str) -> Self {
        Self::get(
            "/token/balance_list",
            vec![("user_addr", wallet.to_string()), ("chain", chain.to_string())],
        )
    }

    /// GET /portfolio/project_list?user_addr={wallet}
    pub fn project_list(wallet: &str) -> Self {
        Self::get("/portfolio/project_list", vec![("user_addr", wallet.to_string())])
    }

    /// GET /asset/net_curve_24h?user_addr={wallet}
    pub fn net_curve_24h(wallet: &str) -> Self {
        Self::get("/asset/net_curve_24h", vec![("user_addr", wallet.to_string())])
    }

    /// GET /user/used_chains?id={wallet}
    pub fn used_chains(wallet: &str) -> Self {
        Self::get("/user/used_chains", vec![("id", wallet.to_string())])
    }

    pub fn for_task(task: &FetchTask) -> Self {
        match task {
            FetchTask::ChainBalance { wallet, chain, .. } => Self::token_balance_list(wallet, chain),
            FetchTask::PoolBalance { wallet } => Self::project_list(wallet),
            FetchTask::WalletTotal { wallet } => Self::net_curve_24h(wallet),
            FetchTask::UsedChains { wallet } => Self::used_chains(wallet),
        }
    }

    /// The value handed to the signer: the query as an object
    pub fn payload(&self) -> Value {
        let object: Map<String, Value> = self
            .params
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.clone())))
            .collect();
        Value::Object(object)
    }

    fn get(path: &'static str, params: Vec<(&'static str, String)>) -> Self {
        Self {
            method: Method::GET,
            path,
            params,
        }
    }
}
