/*
[INPUT]:  Decoded token balances and caller filters (ticker, minimum USD)
[OUTPUT]: Coin holdings with USD valuation that keeps unknown prices unknown
[POS]:    Data layer - valuation and filtering rules for balances
[UPDATE]: When changing USD rounding or filter boundary semantics
*/

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A single token holding on one chain or inside one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub ticker: String,
    pub name: String,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub logo_url: Option<String>,
}

impl Coin {
    /// USD value rounded to cents.
    ///
    /// `None` means unknown: either the API has no price for the token or the
    /// product does not fit in a `Decimal`. Unknown is never treated as zero.
    pub fn usd_value(&self) -> Option<Decimal> {
        let price = self.price?;
        self.amount
            .checked_mul(price)
            .map(|value| value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

/// Sum of USD values over coins with a known price.
pub fn known_usd_total<'a, I>(coins: I) -> Decimal
where
    I: IntoIterator<Item = &'a Coin>,
{
    coins
        .into_iter()
        .filter_map(Coin::usd_value)
        .fold(Decimal::ZERO, |acc, value| acc.saturating_add(value))
}

/// Minimum USD value a coin must reach to be listed for a chain.
///
/// A user-entered `0` (or anything negative) means "no filter", so a coin
/// worth exactly $0.00 is still listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MinUsdFilter(Option<Decimal>);

impl MinUsdFilter {
    pub const NONE: MinUsdFilter = MinUsdFilter(None);

    pub fn from_user_input(value: Decimal) -> Self {
        if value > Decimal::ZERO {
            Self(Some(value))
        } else {
            Self(None)
        }
    }

    pub fn threshold(&self) -> Option<Decimal> {
        self.0
    }

    /// Coins with unknown value always pass; known values pass at or above
    /// the threshold.
    pub fn admits(&self, usd_value: Option<Decimal>) -> bool {
        match (self.0, usd_value) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(min), Some(value)) => value >= min,
        }
    }
}

/// Exact match on the API's display ticker; no filter admits everything.
pub fn ticker_matches(filter: Option<&str>, ticker: &str) -> bool {
    filter.is_none_or(|wanted| wanted == ticker)
}
