//! Order-related types and identifiers.
//!
//! Provides order side, kind, order ID, the immutable order request a
//! strategy emits, and the signed position a broker keeps per feed.

use crate::decimal::{Price, Size};
use crate::error::{CoreError, Result};
use crate::types::FeedId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns 1 for buy, -1 for sell (for position calculations).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Fill at whatever the market gives; the reference price is informational.
    #[default]
    Market,
    /// Fill at the reference price or better.
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Unique order identifier.
///
/// Format: `tb_{timestamp_ms}_{uuid_short}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    /// Create a new unique order ID.
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("tb_{ts}_{uuid_short}"))
    }

    /// Create from an existing string (broker-assigned IDs).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

/// Order request emitted by a strategy.
///
/// Never mutated after creation; fields are private and exposed through
/// getters only. Size is signed: positive buys, negative sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    id: OrderId,
    feed: FeedId,
    size: Size,
    kind: OrderKind,
    reference_price: Price,
    created_at: DateTime<Utc>,
}

impl OrderRequest {
    /// Create a new request. Zero sizes are rejected.
    pub fn new(feed: FeedId, size: Size, kind: OrderKind, reference_price: Price) -> Result<Self> {
        if size.is_zero() {
            return Err(CoreError::InvalidOrder("order size is zero".to_string()));
        }
        if kind == OrderKind::Limit && !reference_price.is_positive() {
            return Err(CoreError::InvalidOrder(format!(
                "limit order needs a positive price, got {reference_price}"
            )));
        }
        Ok(Self {
            id: OrderId::new(),
            feed,
            size,
            kind,
            reference_price,
            created_at: Utc::now(),
        })
    }

    /// Shorthand for a market order.
    pub fn market(feed: FeedId, size: Size, reference_price: Price) -> Result<Self> {
        Self::new(feed, size, OrderKind::Market, reference_price)
    }

    #[must_use]
    pub fn id(&self) -> &OrderId {
        &self.id
    }

    #[must_use]
    pub fn feed(&self) -> FeedId {
        self.feed
    }

    /// Signed size.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    #[must_use]
    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    #[must_use]
    pub fn reference_price(&self) -> Price {
        self.reference_price
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn side(&self) -> OrderSide {
        if self.size.is_negative() {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        }
    }
}

/// Signed position held on a feed's instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub feed: FeedId,
    /// Positive = long, negative = short.
    pub size: Size,
    /// Average entry price of the open size; zero when flat.
    pub avg_price: Price,
}

impl Position {
    pub fn flat(feed: FeedId) -> Self {
        Self {
            feed,
            size: Size::ZERO,
            avg_price: Price::ZERO,
        }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    /// Apply a signed fill.
    ///
    /// Adding to the position re-weights the average price, reducing keeps
    /// it, and crossing through zero restarts it at the fill price.
    pub fn apply_fill(&mut self, fill_size: Size, fill_price: Price) {
        let old = self.size;
        let new = old + fill_size;

        if new.is_zero() {
            self.avg_price = Price::ZERO;
        } else if old.is_zero() || old.is_negative() != new.is_negative() {
            self.avg_price = fill_price;
        } else if old.is_negative() == fill_size.is_negative() {
            let cost = old.notional(self.avg_price) + fill_size.notional(fill_price);
            self.avg_price = Price::new(cost / new.inner());
        }
        self.size = new;
    }
}
