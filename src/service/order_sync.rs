use crate::commerce::{CommercePlatform, Order};
use crate::domain::payment::{OrderState, PaymentState, UpdateAction};
use crate::error::ConnectorError;
use crate::service::concurrency::{update_with_retry, RetryPolicy};
use std::sync::Arc;

/// Pushes derived payment/order states onto the order that references a
/// payment.
#[derive(Clone)]
pub struct OrderStateSync {
    pub commerce: Arc<dyn CommercePlatform>,
    pub retry: RetryPolicy,
}

pub fn order_state_actions(order: &Order, payment_state: PaymentState, order_state: OrderState) -> Vec<UpdateAction> {
    let mut actions = Vec::new();
    if order.payment_state.as_deref() != Some(payment_state.as_str()) {
        actions.push(UpdateAction::ChangePaymentState { payment_state });
    }
    if order.order_state.as_deref() != Some(order_state.as_str()) {
        actions.push(UpdateAction::ChangeOrderState { order_state });
    }
    actions
}

impl OrderStateSync {
    pub fn new(commerce: Arc<dyn CommercePlatform>, retry: RetryPolicy) -> Self {
        Self { commerce, retry }
    }

    /// A payment without an order (checkout not yet completed) is not an
    /// error; `Ok(None)` is returned.
    pub async fn push(
        &self,
        payment_id: &str,
        payment_state: PaymentState,
        order_state: OrderState,
    ) -> Result<Option<Order>, ConnectorError> {
        let Some(order) = self.commerce.find_order_by_payment(payment_id).await? else {
            tracing::debug!(payment_id, "no order references payment yet");
            return Ok(None);
        };
        let updated = update_with_retry(self.commerce.as_ref(), self.retry, order, |current| {
            order_state_actions(current, payment_state, order_state)
        })
        .await?;
        tracing::info!(
            payment_id,
            order_id = %updated.id,
            payment_state = payment_state.as_str(),
            order_state = order_state.as_str(),
            "order state synchronised"
        );
        Ok(Some(updated))
    }

    /// Same as [`push`](Self::push) but never fails the caller.
    pub async fn push_logged(&self, payment_id: &str, payment_state: PaymentState, order_state: OrderState) {
        if let Err(e) = self.push(payment_id, payment_state, order_state).await {
            tracing::error!(payment_id, error = %e, "order state update failed");
        }
    }
}
