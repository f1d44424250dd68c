use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One purchased or renewed membership period, as stored by the hotel API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub userid: String,
    pub expireson: DateTime<Utc>,
    #[serde(default)]
    pub amountpaid: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateSubscriptionRequest {
    pub userid: String,
    pub expireson: DateTime<Utc>,
    pub amountpaid: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateSubscriptionRequest {
    pub id: String,
    pub expireson: DateTime<Utc>,
    pub amountpaid: Decimal,
}

impl Subscription {
    /// Live means strictly after `now`; a record expiring exactly now has lapsed.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expireson > now
    }
}
