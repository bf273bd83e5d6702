use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, DeliveryStatus, Entity as Order, Model as OrderModel,
    PaymentStatus,
};
use crate::errors::AppError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Customer-supplied fields for a new order, already validated and trimmed
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub full_name: String,
    pub email: String,
    pub region: String,
    pub adult_channels: bool,
    pub product_id: String,
}

/// Order store backed by the `orders` table.
///
/// Every status change is a single conditional `UPDATE`; the returned flag
/// says whether this call performed the transition.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, AppError> {
        Order::find_by_id(id)
            .one(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Inserts a pending/pending order with a fresh id
    pub async fn create(&self, new_order: NewOrder) -> Result<OrderModel, AppError> {
        let now = Utc::now();
        let order = OrderActiveModel {
            id: Set(Uuid::new_v4()),
            full_name: Set(new_order.full_name),
            email: Set(new_order.email),
            region: Set(new_order.region),
            adult_channels: Set(new_order.adult_channels),
            product_id: Set(new_order.product_id),
            nowpayments_id: Set(None),
            payment_status: Set(PaymentStatus::Pending),
            delivery_status: Set(DeliveryStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
        };

        order
            .insert(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Stores the gateway invoice id on the order
    pub async fn attach_invoice(&self, id: Uuid, invoice_id: &str) -> Result<(), AppError> {
        let result = Order::update_many()
            .set(OrderActiveModel {
                nowpayments_id: Set(Some(invoice_id.to_string())),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .exec(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Order {} not found", id)));
        }
        Ok(())
    }

    /// Marks a still-pending order as failed on both payment and delivery
    pub async fn mark_checkout_failed(&self, id: Uuid) -> Result<bool, AppError> {
        let result = Order::update_many()
            .set(OrderActiveModel {
                payment_status: Set(PaymentStatus::Failed),
                delivery_status: Set(DeliveryStatus::Failed),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .filter(Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected > 0)
    }

    /// Moves payment status out of `pending`. Terminal states are never
    /// overwritten, so duplicate or late callbacks return `false`.
    pub async fn transition_payment_status(
        &self,
        id: Uuid,
        target: PaymentStatus,
    ) -> Result<bool, AppError> {
        if !target.is_terminal() {
            return Ok(false);
        }

        let result = Order::update_many()
            .set(OrderActiveModel {
                payment_status: Set(target),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .filter(Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)?;

        let changed = result.rows_affected > 0;
        debug!(order_id = %id, target = ?target, changed, "Payment status transition");
        Ok(changed)
    }

    /// Delivery pending -> fulfilled, only once payment is confirmed
    pub async fn mark_fulfilled(&self, id: Uuid) -> Result<bool, AppError> {
        let result = Order::update_many()
            .set(OrderActiveModel {
                delivery_status: Set(DeliveryStatus::Fulfilled),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .filter(Column::PaymentStatus.eq(PaymentStatus::Confirmed))
            .filter(Column::DeliveryStatus.eq(DeliveryStatus::Pending))
            .exec(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected > 0)
    }
}
