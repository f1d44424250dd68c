use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use validator::Validate;

use crate::models::common::SubscriptionPlan;

static CARD_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{16}$").unwrap());
static CARD_EXPIRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(0[1-9]|1[0-2])/[0-9]{2}$").unwrap());
static CARD_CVV: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{3}$").unwrap());

pub const INVALID_CARD_MESSAGE: &str = "Please enter valid card details";

/// Card fields from the upgrade form. Only the format is checked; nothing is charged.
#[derive(Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    #[validate(regex(path = "CARD_NUMBER", message = "Card number must be 16 digits"))]
    pub card_number: String,

    #[validate(custom = "not_blank")]
    pub cardholder_name: String,

    #[validate(regex(path = "CARD_EXPIRY", message = "Expiry must be MM/YY"))]
    pub expiry: String,

    #[validate(regex(path = "CARD_CVV", message = "CVV must be 3 digits"))]
    pub cvv: String,
}

// Card data must never end up in logs.
impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardDetails")
            .field("card_number", &"****")
            .field("cardholder_name", &self.cardholder_name)
            .finish_non_exhaustive()
    }
}

fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank_cardholder_name"));
    }
    Ok(())
}

impl CardDetails {
    /// Collapses any field failure into the single message shown on the payment step.
    pub fn check(&self) -> Result<(), String> {
        self.validate().map_err(|errors| {
            log::debug!("Card validation failed on fields: {:?}", errors.field_errors().keys().collect::<Vec<_>>());
            INVALID_CARD_MESSAGE.to_string()
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub email: String,
    pub plan: SubscriptionPlan,
    pub card: CardDetails,
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    pub email: String,
}
