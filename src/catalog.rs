//! Static subscription plan table.
//!
//! Plans are process-wide constants; the product registry mirrors them into
//! the database on demand so orders always reference a valid product row.

use serde::Serialize;

/// Days credited per month of subscription
pub const DAYS_PER_MONTH: i32 = 30;

/// A subscription offering selectable at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    pub duration_months: i32,
    /// Price in whole US dollars
    pub price_usd: i64,
    pub popular: bool,
    pub billing_cycle: &'static str,
    pub renewal_policy: &'static str,
    pub access_window: &'static str,
    pub perks: &'static [&'static str],
}

impl Plan {
    /// Duration credited to the product row
    pub fn duration_days(&self) -> i32 {
        self.duration_months * DAYS_PER_MONTH
    }

    /// Display price, e.g. `$59`
    pub fn display_price(&self) -> String {
        format!("${}", self.price_usd)
    }

    /// Line shown on the gateway's hosted invoice page
    pub fn invoice_description(&self) -> String {
        format!("{} subscription", self.name)
    }
}

pub static PLANS: [Plan; 3] = [
    Plan {
        id: "plan_12m",
        name: "12 Months",
        duration_months: 12,
        price_usd: 59,
        popular: true,
        billing_cycle: "Annual subscription (12 months)",
        renewal_policy: "Auto-renews yearly; cancel anytime before renewal.",
        access_window: "Full access for 12 months",
        perks: &[
            "4K & HD channels",
            "Anti-freeze streams",
            "24/7 support",
            "Up to 2 devices",
            "Includes live sports & series",
        ],
    },
    Plan {
        id: "plan_6m",
        name: "6 Months",
        duration_months: 6,
        price_usd: 39,
        popular: false,
        billing_cycle: "6-month subscription",
        renewal_policy: "Renews every 6 months; pause or cancel anytime.",
        access_window: "Full access for 6 months",
        perks: &[
            "Full VOD library",
            "Sports & PPV included",
            "24/7 support",
            "Priority event access",
        ],
    },
    Plan {
        id: "plan_3m",
        name: "3 Months",
        duration_months: 3,
        price_usd: 29,
        popular: false,
        billing_cycle: "Quarterly subscription",
        renewal_policy: "Renews every 3 months; cancel anytime.",
        access_window: "Full access for 3 months",
        perks: &[
            "Instant activation",
            "Flexible quarterly billing",
            "24/7 support",
            "Live sports + movies",
        ],
    },
];

/// All plans in display order
pub fn plans() -> &'static [Plan] {
    &PLANS
}

/// Looks up a plan by its canonical id. Legacy aliases are not resolved here.
pub fn find_plan(id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|plan| plan.id == id)
}
