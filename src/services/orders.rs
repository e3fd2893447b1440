use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewOrderItem {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub product_name: String,
    pub product_price: Decimal,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewOrder {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 1, message = "Phone cannot be empty"))]
    pub customer_phone: String,
    #[validate(length(min = 1, message = "Address cannot be empty"))]
    pub shipping_address: String,
    #[validate(length(min = 1, message = "Cart cannot be empty"))]
    pub items: Vec<NewOrderItem>,
}

/// Persistence workflows around orders and their line items.
#[derive(Clone)]
pub struct OrderService {
    db: DbPool,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: DbPool, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            error!("failed to emit event: {}", e);
        }
    }

    /// Creates a pending order plus its line items in one transaction.
    /// The total is computed server-side from the item snapshot.
    #[instrument(skip(self, new_order), fields(user_id = %new_order.user_id))]
    pub async fn create_pending_order(
        &self,
        new_order: NewOrder,
        provider_order_id: Option<String>,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        new_order.validate()?;
        for item in &new_order.items {
            item.validate()?;
            if item.product_price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "item {} has a non-positive price",
                    item.product_id
                )));
            }
        }

        let total: Decimal = new_order
            .items
            .iter()
            .map(|i| i.product_price * Decimal::from(i.quantity))
            .sum();

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(new_order.user_id),
            total_amount: Set(total),
            status: Set(OrderStatus::Pending.to_string()),
            customer_name: Set(new_order.customer_name),
            customer_email: Set(new_order.customer_email),
            customer_phone: Set(new_order.customer_phone),
            shipping_address: Set(new_order.shipping_address),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            payment_method: Set(None),
            provider_order_id: Set(provider_order_id),
            provider_payment_id: Set(None),
            provider_signature: Set(None),
            awb_code: Set(None),
            shipment_id: Set(None),
            courier_name: Set(None),
            tracking_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(new_order.items.len());
        for item in new_order.items {
            let saved = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                product_name: Set(item.product_name),
                product_price: Set(item.product_price),
                quantity: Set(item.quantity),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(saved);
        }

        txn.commit().await?;

        info!(order_id = %order.id, total = %order.total_amount, "pending order created");
        self.emit(Event::OrderCreated(order.id)).await;

        Ok((order, items))
    }

    pub async fn get_order(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    pub async fn get_order_with_items(
        &self,
        id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order = self.get_order(id).await?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok((order, items))
    }

    pub async fn find_by_provider_order(
        &self,
        provider_order_id: &str,
    ) -> Result<order::Model, ServiceError> {
        order::Entity::find()
            .filter(order::Column::ProviderOrderId.eq(provider_order_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No order for provider order {}",
                    provider_order_id
                ))
            })
    }

    /// Marks payment completed and the order confirmed. Idempotent: a
    /// replay with the same payment id returns `(order, true)` without
    /// writing. A different payment id on a completed order is rejected.
    #[instrument(skip(self, signature))]
    pub async fn mark_payment_completed(
        &self,
        order_id: Uuid,
        payment_id: &str,
        signature: &str,
        payment_method: Option<String>,
    ) -> Result<(order::Model, bool), ServiceError> {
        let order = self.get_order(order_id).await?;

        if order.payment_status == PaymentStatus::Completed.to_string() {
            if order.provider_payment_id.as_deref() == Some(payment_id) {
                return Ok((order, true));
            }
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is already paid with a different payment",
                order_id
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Completed.to_string());
        active.status = Set(OrderStatus::Confirmed.to_string());
        active.provider_payment_id = Set(Some(payment_id.to_string()));
        active.provider_signature = Set(Some(signature.to_string()));
        active.payment_method = Set(payment_method);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        info!(order_id = %updated.id, payment_id, "payment completed, order confirmed");
        self.emit(Event::PaymentVerified {
            order_id: updated.id,
            provider_payment_id: payment_id.to_string(),
        })
        .await;
        self.emit(Event::OrderConfirmed(updated.id)).await;

        Ok((updated, false))
    }

    /// Records a failed payment attempt. The order stays pending so the
    /// customer can retry with a fresh receipt.
    pub async fn mark_payment_failed(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;

        if order.payment_status == PaymentStatus::Completed.to_string() {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is already paid",
                order_id
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Failed.to_string());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.emit(Event::PaymentFailed {
            order_id: updated.id,
            reason: reason.to_string(),
        })
        .await;

        Ok(updated)
    }

    /// Moves an order to a new fulfillment status, enforcing the monotonic
    /// transition matrix. Returns the updated order and the old status.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<(order::Model, String), ServiceError> {
        let order = self.get_order(order_id).await?;
        let current = OrderStatus::from_str(&order.status)
            .map_err(ServiceError::InternalError)?;

        if !current.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot move order from {} to {}",
                current, new_status
            )));
        }

        let old_status = order.status.clone();
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status.to_string());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        info!(order_id = %updated.id, from = %old_status, to = %new_status, "order status changed");
        self.emit(Event::OrderStatusChanged {
            order_id: updated.id,
            old_status: old_status.clone(),
            new_status: new_status.to_string(),
        })
        .await;
        if new_status == OrderStatus::Cancelled {
            self.emit(Event::OrderCancelled(updated.id)).await;
        }

        Ok((updated, old_status))
    }

    /// Writes shipment tracking fields back onto the order.
    pub async fn attach_shipment(
        &self,
        order_id: Uuid,
        shipment_id: i64,
        awb_code: Option<String>,
        courier_name: Option<String>,
        tracking_url: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;

        let mut active: order::ActiveModel = order.into();
        active.shipment_id = Set(Some(shipment_id));
        active.awb_code = Set(awb_code);
        active.courier_name = Set(courier_name);
        active.tracking_url = Set(tracking_url);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.emit(Event::ShipmentCreated {
            order_id: updated.id,
            shipment_id,
        })
        .await;

        Ok(updated)
    }

    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&self.db, per_page.clamp(1, 100));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }
}
