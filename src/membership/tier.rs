//! Membership tier levels.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    Free,
    /// Paid tier; bookings get a 10% discount.
    Gold,
}

impl MembershipTier {
    pub fn is_paid(&self) -> bool {
        matches!(self, MembershipTier::Gold)
    }

    pub fn discount_percent(&self) -> u32 {
        match self {
            MembershipTier::Free => 0,
            MembershipTier::Gold => 10,
        }
    }

    /// Price after the tier's discount, rounded to cents.
    pub fn apply_discount(&self, amount: Decimal) -> Decimal {
        let factor = Decimal::ONE_HUNDRED - Decimal::from(self.discount_percent());
        (amount * factor / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl std::fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipTier::Free => write!(f, "free"),
            MembershipTier::Gold => write!(f, "gold"),
        }
    }
}
