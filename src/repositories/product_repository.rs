use chrono::Utc;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::Plan;
use crate::entities::product::{
    ActiveModel as ProductActiveModel, Column, Entity as Product, Model as ProductModel,
};
use crate::errors::AppError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Product registry backed by the `products` table
#[derive(Debug, Clone)]
pub struct ProductRepository {
    base: BaseRepository,
}

impl ProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find a product by plan id
    pub async fn find_by_id(&self, id: &str) -> Result<Option<ProductModel>, AppError> {
        Product::find_by_id(id.to_string())
            .one(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Inserts the plan's product row or refreshes the existing one.
    ///
    /// A single `INSERT ... ON CONFLICT (id) DO UPDATE` so concurrent checkouts
    /// for the same plan never race on creation. `created_at` is kept from the
    /// first insert.
    pub async fn upsert_from_plan(&self, plan: &Plan) -> Result<ProductModel, AppError> {
        let db = self.base.get_db();

        Product::insert(ProductActiveModel::from_plan(plan, Utc::now()))
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::Name,
                        Column::Description,
                        Column::PriceUsd,
                        Column::DurationDays,
                        Column::Active,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await
            .map_err(AppError::DatabaseError)?;

        debug!(product_id = plan.id, "Product row upserted");

        self.find_by_id(plan.id).await?.ok_or_else(|| {
            AppError::InternalError(format!("product {} missing after upsert", plan.id))
        })
    }
}
