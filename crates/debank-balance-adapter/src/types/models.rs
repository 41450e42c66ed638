/*
[INPUT]:  Balance API `data` payloads and serde requirements
[OUTPUT]: Typed wire structs convertible into domain coins
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new endpoints are decoded
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::coin::{Coin, MinUsdFilter, ticker_matches};

/// Token entry as returned by `/token/balance_list` and inside pool items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToken {
    #[serde(default, deserialize_with = "serde_helpers::deserialize_lossy_decimal")]
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "serde_helpers::deserialize_lossy_decimal")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub optimized_symbol: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

impl ApiToken {
    pub fn ticker(&self) -> &str {
        match self.optimized_symbol.as_deref() {
            Some(symbol) if !symbol.is_empty() => symbol,
            _ => &self.symbol,
        }
    }

    /// Convert into a domain coin. Tokens whose amount cannot be represented
    /// are dropped.
    pub fn into_coin(self) -> Option<Coin> {
        let ticker = self.ticker().to_string();
        let amount = self.amount?;
        Some(Coin {
            ticker,
            name: self.name,
            amount,
            price: self.price,
            logo_url: self.logo_url,
        })
    }
}

/// Apply ticker and minimum-USD filters to one chain's token list.
pub fn select_coins(
    tokens: Vec<ApiToken>,
    ticker: Option<&str>,
    min_usd: MinUsdFilter,
) -> Vec<Coin> {
    tokens
        .into_iter()
        .filter(|token| ticker_matches(ticker, token.ticker()))
        .filter_map(ApiToken::into_coin)
        .filter(|coin| min_usd.admits(coin.usd_value()))
        .collect()
}

/// Protocol entry from `/portfolio/project_list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiProject {
    pub name: String,
    pub chain: String,
    #[serde(default)]
    pub portfolio_item_list: Vec<ApiPortfolioItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPortfolioItem {
    #[serde(default)]
    pub asset_token_list: Vec<ApiToken>,
}

impl ApiProject {
    /// Display key used for a pool, e.g. `Uniswap V3 (eth)`
    pub fn pool_key(&self) -> String {
        format!("{} ({})", self.name, self.chain)
    }
}

/// Group project holdings by pool key. Projects sharing a key are merged.
pub fn group_pools(projects: Vec<ApiProject>) -> BTreeMap<String, Vec<Coin>> {
    let mut pools: BTreeMap<String, Vec<Coin>> = BTreeMap::new();
    for project in projects {
        let entry = pools.entry(project.pool_key()).or_default();
        entry.extend(
            project
                .portfolio_item_list
                .into_iter()
                .flat_map(|item| item.asset_token_list)
                .filter_map(ApiToken::into_coin),
        );
    }
    pools
}

/// `/asset/net_curve_24h` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetCurve {
    #[serde(default)]
    pub usd_value_list: Vec<NetCurvePoint>,
}

/// `[timestamp, usd_value]` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetCurvePoint(
    pub f64,
    #[serde(deserialize_with = "serde_helpers::deserialize_lossy_decimal")] pub Option<Decimal>,
);

impl NetCurve {
    /// Most recent USD value on the curve
    pub fn latest_usd(&self) -> Option<Decimal> {
        self.usd_value_list.last().and_then(|point| point.1)
    }
}

/// `/user/used_chains` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsedChains {
    #[serde(default)]
    pub chains: Vec<UsedChainEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsedChainEntry {
    Id(String),
    Detailed { id: String },
}

impl UsedChainEntry {
    pub fn id(&self) -> &str {
        match self {
            UsedChainEntry::Id(id) => id,
            UsedChainEntry::Detailed { id } => id,
        }
    }
}

mod serde_helpers {
    use super::Decimal;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::str::FromStr;

    /// Accept numbers, numeric strings and null. Values that do not fit in a
    /// `Decimal` become `None` instead of failing the whole payload.
    pub fn deserialize_lossy_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(None),
            Value::String(raw) => Ok(parse_decimal(raw.trim())),
            Value::Number(number) => Ok(parse_decimal(&number.to_string())),
            _ => Err(serde::de::Error::custom("invalid decimal value")),
        }
    }

    fn parse_decimal(raw: &str) -> Option<Decimal> {
        if raw.is_empty() {
            return None;
        }
        Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(value: serde_json::Value) -> ApiToken {
        serde_json::from_value(value).expect("token should deserialize")
    }

    #[test]
    fn token_deserializes_float_fields() {
        let parsed = token(json!({
            "amount": 1.5,
            "price": 2000.25,
            "name": "Ether",
            "symbol": "ETH",
            "optimized_symbol": "ETH",
            "logo_url": "https://static.debank.com/eth.png"
        }));

        assert_eq!(parsed.amount, Some(Decimal::new(15, 1)));
        assert_eq!(parsed.price, Some(Decimal::new(200025, 2)));
        assert_eq!(parsed.ticker(), "ETH");
    }

    #[test]
    fn token_null_price_stays_unknown() {
        let parsed = token(json!({
            "amount": 10,
            "price": null,
            "name": "Airdrop",
            "symbol": "AIR",
            "optimized_symbol": "AIR"
        }));

        let coin = parsed.into_coin().expect("coin");
        assert_eq!(coin.price, None);
        assert_eq!(coin.usd_value(), None);
    }

    #[test]
    fn token_with_unrepresentable_amount_is_dropped() {
        let parsed = token(json!({
            "amount": 1e40,
            "price": 0.0,
            "name": "Spam",
            "symbol": "SPAM"
        }));

        assert_eq!(parsed.amount, None);
        assert!(parsed.into_coin().is_none());
    }

    #[test]
    fn ticker_falls_back_to_symbol() {
        let parsed = token(json!({"amount": 1, "price": 1, "name": "X", "symbol": "XYZ"}));
        assert_eq!(parsed.ticker(), "XYZ");
    }

    #[test]
    fn select_coins_applies_ticker_and_threshold() {
        let tokens = vec![
            token(json!({"amount": 1, "price": 5, "name": "A", "symbol": "AAA", "optimized_symbol": "AAA"})),
            token(json!({"amount": 1, "price": 0.5, "name": "A", "symbol": "AAA", "optimized_symbol": "AAA"})),
            token(json!({"amount": 1, "price": 5, "name": "B", "symbol": "BBB", "optimized_symbol": "BBB"})),
            token(json!({"amount": 1, "price": null, "name": "A", "symbol": "AAA", "optimized_symbol": "AAA"})),
        ];

        let coins = select_coins(tokens, Some("AAA"), MinUsdFilter::from_user_input(Decimal::ONE));

        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].price, Some(Decimal::from(5)));
        assert_eq!(coins[1].price, None);
    }

    #[test]
    fn select_coins_without_filter_keeps_zero_value() {
        let tokens = vec![token(
            json!({"amount": 3, "price": 0, "name": "Dust", "symbol": "DUST"}),
        )];

        let coins = select_coins(tokens, None, MinUsdFilter::from_user_input(Decimal::ZERO));

        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].usd_value(), Some(Decimal::ZERO));
    }

    #[test]
    fn pools_group_by_name_and_chain() {
        let projects: Vec<ApiProject> = serde_json::from_value(json!([
            {
                "name": "Uniswap V3",
                "chain": "eth",
                "portfolio_item_list": [
                    {"asset_token_list": [{"amount": 1, "price": 1, "name": "USD Coin", "symbol": "USDC"}]},
                    {"asset_token_list": [{"amount": 2, "price": 3000, "name": "Ether", "symbol": "ETH"}]}
                ]
            },
            {"name": "Aave V3", "chain": "arb", "portfolio_item_list": []}
        ]))
        .expect("projects");

        let pools = group_pools(projects);

        assert_eq!(pools.len(), 2);
        assert_eq!(pools["Uniswap V3 (eth)"].len(), 2);
        assert!(pools["Aave V3 (arb)"].is_empty());
    }

    #[test]
    fn net_curve_latest_value() {
        let curve: NetCurve = serde_json::from_value(json!({
            "usd_value_list": [[1700000000, 10.5], [1700000300, 12.25]]
        }))
        .expect("curve");

        assert_eq!(curve.latest_usd(), Some(Decimal::new(1225, 2)));
    }

    #[test]
    fn used_chains_accepts_ids_and_objects() {
        let data: UsedChains = serde_json::from_value(json!({
            "chains": ["eth", {"id": "arb", "name": "Arbitrum"}]
        }))
        .expect("used chains");

        let ids: Vec<&str> = data.chains.iter().map(UsedChainEntry::id).collect();
        assert_eq!(ids, vec!["eth", "arb"]);
    }
}
