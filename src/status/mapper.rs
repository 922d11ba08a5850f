//! Translation between gateway statuses, connector tags and the platform's
//! payment/order states.

use super::GatewayStatus;
use crate::domain::payment::{OrderState, PaymentState};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTriple {
    pub tag: GatewayStatus,
    pub payment_state: PaymentState,
    pub order_state: OrderState,
}

impl StatusTriple {
    const fn new(tag: GatewayStatus, payment_state: PaymentState, order_state: OrderState) -> Self {
        Self {
            tag,
            payment_state,
            order_state,
        }
    }
}

/// Maps a raw gateway transaction status (case-insensitive) to a triple.
/// `capture` only matters for pending charges: an uncaptured pending charge
/// is an authorization. Unknown statuses fall back to pending.
pub fn map_gateway_status(status: &str, capture: bool) -> StatusTriple {
    use GatewayStatus as G;
    match status.trim().to_ascii_lowercase().as_str() {
        "complete" => StatusTriple::new(G::Paid, PaymentState::Paid, OrderState::Complete),
        "pending" | "pre_authentication_pending" if !capture => {
            StatusTriple::new(G::Authorize, PaymentState::Paid, OrderState::Open)
        }
        "cancelled" => StatusTriple::new(G::Cancelled, PaymentState::Paid, OrderState::Cancelled),
        "refunded" => StatusTriple::new(G::Refunded, PaymentState::Paid, OrderState::Complete),
        "requested" => StatusTriple::new(G::Requested, PaymentState::Pending, OrderState::Open),
        "declined" | "failed" => StatusTriple::new(G::Failed, PaymentState::Failed, OrderState::Cancelled),
        _ => StatusTriple::new(G::Pending, PaymentState::Pending, OrderState::Open),
    }
}

/// States pushed to the order after a synchronous, merchant-visible change.
pub fn states_for_tag(tag: GatewayStatus) -> (PaymentState, OrderState) {
    use GatewayStatus as G;
    match tag {
        G::Paid | G::PartialPaid | G::Refunded | G::PartialRefund => (PaymentState::Paid, OrderState::Complete),
        G::Authorize => (PaymentState::Paid, OrderState::Open),
        G::Cancelled => (PaymentState::Paid, OrderState::Cancelled),
        G::Failed => (PaymentState::Failed, OrderState::Cancelled),
        G::Pending | G::Requested => (PaymentState::Pending, OrderState::Open),
    }
}

/// States pushed after a webhook-derived change. A partial capture keeps the
/// order open since more funds may still be captured.
pub fn webhook_states_for_tag(tag: GatewayStatus) -> (PaymentState, OrderState) {
    match tag {
        GatewayStatus::PartialPaid => (PaymentState::Paid, OrderState::Open),
        other => states_for_tag(other),
    }
}

/// Status recorded right after a synchronous charge call.
pub fn status_after_charge(direct_charge: bool, success: bool) -> GatewayStatus {
    match (success, direct_charge) {
        (true, true) => GatewayStatus::Paid,
        (true, false) => GatewayStatus::Authorize,
        (false, _) => GatewayStatus::Failed,
    }
}

/// Downgrades `paid` to `p-paid` when less than the order amount was captured.
pub fn refine_capture(tag: GatewayStatus, captured: Decimal, order_amount: Decimal) -> GatewayStatus {
    if tag == GatewayStatus::Paid && captured < order_amount {
        GatewayStatus::PartialPaid
    } else {
        tag
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundOutcome {
    pub status: GatewayStatus,
    pub refunded_total: Decimal,
}

/// Adds a refund to the running total. Reaching the order amount is a full
/// refund and the stored total is clamped to the order amount exactly.
pub fn accumulate_refund(previous: Decimal, refund: Decimal, order_amount: Decimal) -> RefundOutcome {
    let total = previous + refund;
    if total < order_amount {
        RefundOutcome {
            status: GatewayStatus::PartialRefund,
            refunded_total: total,
        }
    } else {
        RefundOutcome {
            status: GatewayStatus::Refunded,
            refunded_total: order_amount,
        }
    }
}

/// Outcome of a charge resumed after a standalone fraud check.
pub fn fraud_completion_status(authorization: bool, charge_status: &str) -> (GatewayStatus, PaymentState) {
    let status = charge_status.trim().to_ascii_lowercase();
    match (authorization, status.as_str()) {
        (true, "pending" | "pre_authentication_pending") => (GatewayStatus::Authorize, PaymentState::Pending),
        (_, "complete") => (GatewayStatus::Paid, PaymentState::Paid),
        _ => (GatewayStatus::Pending, PaymentState::Pending),
    }
}
