use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::catalog::Plan;

/// Durable mirror of a catalog plan. The id is the plan id.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_usd: i64,
    pub duration_days: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    /// Builds a full row from catalog data, stamped with `now`
    pub fn from_plan(plan: &Plan, now: DateTime<Utc>) -> Self {
        Self {
            id: Set(plan.id.to_string()),
            name: Set(plan.name.to_string()),
            description: Set(plan.billing_cycle.to_string()),
            price_usd: Set(plan.price_usd),
            duration_days: Set(plan.duration_days()),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }
}
