use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error),
        }
    }
}

/// Gold membership plans offered on the upgrade screen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Monthly,
    Yearly,
}

impl SubscriptionPlan {
    pub const ALL: [SubscriptionPlan; 2] = [SubscriptionPlan::Monthly, SubscriptionPlan::Yearly];

    pub fn price(&self) -> Decimal {
        match self {
            SubscriptionPlan::Monthly => Decimal::new(19_99, 2), // $19.99
            SubscriptionPlan::Yearly => Decimal::new(199_00, 2), // $199.00
        }
    }

    pub fn duration_days(&self) -> i64 {
        match self {
            SubscriptionPlan::Monthly => 30,
            SubscriptionPlan::Yearly => 365,
        }
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionPlan::Monthly => write!(f, "monthly"),
            SubscriptionPlan::Yearly => write!(f, "yearly"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub plan: SubscriptionPlan,
    pub price: Decimal,
    pub duration_days: i64,
}

impl From<SubscriptionPlan> for PlanSummary {
    fn from(plan: SubscriptionPlan) -> Self {
        Self {
            plan,
            price: plan.price(),
            duration_days: plan.duration_days(),
        }
    }
}
