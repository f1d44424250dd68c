//! Derives the current membership from a user's subscription history.
//!
//! The view is never stored on its own. Callers keep the subscription list
//! and re-run [`resolve`] whenever the profile is fetched again, so the tier
//! can't drift from its source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::membership::tier::MembershipTier;
use crate::models::subscription::Subscription;

/// Which live subscription counts as the active one when several are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// First live record in the order the API returned them.
    #[default]
    FirstMatch,
    /// Live record with the latest `expireson`. Ties keep the earlier record.
    MaxExpiry,
}

impl std::str::FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first-match" | "first_match" | "first" => Ok(SelectionPolicy::FirstMatch),
            "max-expiry" | "max_expiry" | "max" => Ok(SelectionPolicy::MaxExpiry),
            other => Err(format!(
                "{} is not a supported selection policy. Use either 'first-match' or 'max-expiry'.",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipView {
    pub tier: MembershipTier,
    pub expiry_date: Option<DateTime<Utc>>,
    pub subscription_id: Option<String>,
}

impl MembershipView {
    pub fn free() -> Self {
        Self {
            tier: MembershipTier::Free,
            expiry_date: None,
            subscription_id: None,
        }
    }

    fn gold(subscription: &Subscription) -> Self {
        Self {
            tier: MembershipTier::Gold,
            expiry_date: Some(subscription.expireson),
            subscription_id: Some(subscription.id.clone()),
        }
    }

    pub fn is_gold(&self) -> bool {
        self.tier == MembershipTier::Gold
    }
}

/// Maps subscription history and the current instant to a membership view.
pub fn resolve(
    subscriptions: Option<&[Subscription]>,
    now: DateTime<Utc>,
    policy: SelectionPolicy,
) -> MembershipView {
    let mut live = subscriptions.unwrap_or_default().iter().filter(|s| s.is_live_at(now));

    let active = match policy {
        SelectionPolicy::FirstMatch => live.next(),
        SelectionPolicy::MaxExpiry => live.fold(None, |best: Option<&Subscription>, candidate| match best {
            Some(current) if current.expireson >= candidate.expireson => Some(current),
            _ => Some(candidate),
        }),
    };

    active.map(MembershipView::gold).unwrap_or_else(MembershipView::free)
}
