use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{catalog, ApiResponse};

/// Public view of a catalog plan
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub duration_months: i32,
    pub price_usd: i64,
    pub display_price: String,
    pub popular: bool,
    pub billing_cycle: String,
    pub renewal_policy: String,
    pub access_window: String,
    pub perks: Vec<String>,
}

impl From<&catalog::Plan> for PlanResponse {
    fn from(plan: &catalog::Plan) -> Self {
        Self {
            id: plan.id.to_string(),
            name: plan.name.to_string(),
            duration_months: plan.duration_months,
            price_usd: plan.price_usd,
            display_price: plan.display_price(),
            popular: plan.popular,
            billing_cycle: plan.billing_cycle.to_string(),
            renewal_policy: plan.renewal_policy.to_string(),
            access_window: plan.access_window.to_string(),
            perks: plan.perks.iter().map(|perk| perk.to_string()).collect(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/plans",
    responses(
        (status = 200, description = "Subscription plans in display order", body = crate::ApiResponse<Vec<PlanResponse>>)
    ),
    tag = "Plans"
)]
pub async fn list_plans() -> Json<ApiResponse<Vec<PlanResponse>>> {
    let plans = catalog::plans().iter().map(PlanResponse::from).collect();
    Json(ApiResponse::success(plans))
}
