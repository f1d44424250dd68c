use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::models::common::SubscriptionPlan;

/// Renewals always buy one more year at the yearly price.
pub const RENEWAL_PLAN: SubscriptionPlan = SubscriptionPlan::Yearly;

pub fn purchase_expiry(plan: SubscriptionPlan, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(plan.duration_days())
}

/// Extends from whichever is later: the current expiry or now.
/// Early renewals keep their remaining time, lapsed ones restart from now.
pub fn renewal_expiry(current_expiry: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    current_expiry.max(now) + Duration::days(RENEWAL_PLAN.duration_days())
}

pub fn renewal_price() -> Decimal {
    RENEWAL_PLAN.price()
}
