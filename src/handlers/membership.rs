use actix_web::web::{Data, Json, Path, Query};
use actix_web::{get, post, HttpResponse, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MembershipError;
use crate::membership::{resolver::MembershipView, service::MembershipService, tier::MembershipTier};
use crate::models::{
    common::{ApiResponse, PlanSummary, SubscriptionPlan},
    payment::{PurchaseRequest, RenewRequest},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub tier: MembershipTier,
    pub expiry_date: Option<DateTime<Utc>>,
    pub subscription_id: Option<String>,
    pub discount_percent: u32,
}

impl From<MembershipView> for MembershipResponse {
    fn from(view: MembershipView) -> Self {
        Self {
            discount_percent: view.tier.discount_percent(),
            tier: view.tier,
            expiry_date: view.expiry_date,
            subscription_id: view.subscription_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub amount: String,
}

/// A room price with the member discount applied.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub tier: MembershipTier,
    pub discount_percent: u32,
    pub amount: Decimal,
    pub discounted_amount: Decimal,
}

fn parse_amount(raw: &str) -> Result<Decimal, MembershipError> {
    match Decimal::from_str(raw.trim()) {
        Ok(amount) if !amount.is_sign_negative() => Ok(amount),
        _ => Err(MembershipError::Validation(format!("Invalid amount: {}", raw))),
    }
}

fn error_response(err: &MembershipError) -> HttpResponse {
    let body = ApiResponse::<()>::error(err.to_string());
    match err {
        MembershipError::Validation(_) => HttpResponse::BadRequest().json(body),
        MembershipError::AlreadyGold | MembershipError::NotGold => HttpResponse::Conflict().json(body),
        MembershipError::WorkflowInFlight => HttpResponse::TooManyRequests().json(body),
        MembershipError::ProfileNotFound => HttpResponse::NotFound().json(body),
        MembershipError::RemoteWrite { .. } | MembershipError::RemoteRead(_) => {
            HttpResponse::BadGateway().json(body)
        }
    }
}

// GET /membership/plans
#[get("/plans")]
pub async fn list_plans() -> Result<HttpResponse> {
    let plans: Vec<PlanSummary> = SubscriptionPlan::ALL.into_iter().map(PlanSummary::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(plans)))
}

// GET /membership/{email}
#[get("/{email}")]
pub async fn get_membership(
    service: Data<MembershipService>,
    path: Path<String>,
) -> Result<HttpResponse> {
    let email = path.into_inner();

    match service.membership(&email, Utc::now()).await {
        Ok(view) => Ok(HttpResponse::Ok().json(ApiResponse::success(MembershipResponse::from(view)))),
        Err(e) => {
            log::warn!("Membership lookup for {} failed: {}", email, e);
            Ok(error_response(&e))
        }
    }
}

// GET /membership/{email}/quote?amount=250.00
#[get("/{email}/quote")]
pub async fn quote_price(
    service: Data<MembershipService>,
    path: Path<String>,
    query: Query<QuoteQuery>,
) -> Result<HttpResponse> {
    let email = path.into_inner();

    let amount = match parse_amount(&query.amount) {
        Ok(amount) => amount,
        Err(e) => return Ok(error_response(&e)),
    };

    match service.membership(&email, Utc::now()).await {
        Ok(view) => Ok(HttpResponse::Ok().json(ApiResponse::success(QuoteResponse {
            tier: view.tier,
            discount_percent: view.tier.discount_percent(),
            amount,
            discounted_amount: view.tier.apply_discount(amount),
        }))),
        Err(e) => {
            log::warn!("Price quote for {} failed: {}", email, e);
            Ok(error_response(&e))
        }
    }
}

// POST /membership/purchase
#[post("/purchase")]
pub async fn purchase_membership(
    service: Data<MembershipService>,
    payload: Json<PurchaseRequest>,
) -> Result<HttpResponse> {
    match service.purchase(&payload, Utc::now()).await {
        Ok(outcome) => Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
            outcome,
            "Welcome to Gold membership".to_string(),
        ))),
        Err(e) => Ok(error_response(&e)),
    }
}

// POST /membership/renew
#[post("/renew")]
pub async fn renew_membership(
    service: Data<MembershipService>,
    payload: Json<RenewRequest>,
) -> Result<HttpResponse> {
    match service.renew(&payload.email, Utc::now()).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            outcome,
            "Gold membership renewed".to_string(),
        ))),
        Err(e) => Ok(error_response(&e)),
    }
}
