use crate::domain::extension::{MakePaymentRequest, OutcomeStatus};
use crate::domain::payment::{
    key_update_action, Payment, UpdateAction, FIELD_ADDITIONAL_INFORMATION, FIELD_CAPTURED_AMOUNT,
    FIELD_EXTENSION_RESPONSE, FIELD_PAYMENT_TYPE, FIELD_TRANSACTION_ID, FIELD_USER_ID,
};
use crate::service::orchestrator::ChargeOutcome;
use crate::status::mapper::states_for_tag;
use crate::status::GatewayStatus;
use serde_json::json;

const INVALID_TRANSACTION: &str = "Invalid transaction details";

/// Payment update actions answering a make-payment request.
///
/// A failed charge only reports the failure in `PaymentExtensionResponse`.
/// Otherwise the durable fields are written, the key moves to the gateway
/// charge id, and the response carries the derived order states.
pub fn make_payment_actions(payment: &Payment, request: &MakePaymentRequest, outcome: &ChargeOutcome) -> Vec<UpdateAction> {
    if outcome.status != OutcomeStatus::Success {
        let message = Some(outcome.message.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(INVALID_TRANSACTION);
        return vec![UpdateAction::set_json_field(
            FIELD_EXTENSION_RESPONSE,
            &json!({ "status": outcome.status.as_str(), "message": message }),
        )];
    }

    let mut actions = Vec::new();
    let tag = outcome
        .gateway_status
        .or_else(|| request.payment_status.as_deref().and_then(|s| s.parse::<GatewayStatus>().ok()));
    let charge_id = outcome.charge_id.as_deref().filter(|id| !id.is_empty() && *id != "0");

    if let Some(payment_type) = request.payment_type.as_deref() {
        actions.push(UpdateAction::set_field(FIELD_PAYMENT_TYPE, payment_type));
    }
    if let Some(tag) = tag {
        actions.push(UpdateAction::set_status(tag));
    }
    if let Some(transaction_id) = charge_id.or(request.transaction_token.as_deref()) {
        actions.push(UpdateAction::set_field(FIELD_TRANSACTION_ID, transaction_id));
    }
    if let Some(user_id) = request.user_id.as_deref().filter(|u| !u.is_empty()) {
        actions.push(UpdateAction::set_field(FIELD_USER_ID, user_id));
    }
    if let Some(info) = &request.additional_info {
        actions.push(UpdateAction::set_json_field(FIELD_ADDITIONAL_INFORMATION, info));
    }
    if let Some(set_key) = key_update_action(payment.key.as_deref(), charge_id) {
        actions.push(set_key);
    }

    if let Some(tag) = tag {
        let (payment_state, order_state) = states_for_tag(tag);
        actions.push(UpdateAction::set_json_field(
            FIELD_EXTENSION_RESPONSE,
            &json!({ "orderPaymentStatus": payment_state, "orderStatus": order_state }),
        ));
        if tag == GatewayStatus::Paid {
            actions.push(UpdateAction::set_amount(
                FIELD_CAPTURED_AMOUNT,
                payment.amount_planned.decimal_amount(),
            ));
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Money, FIELD_PAYMENT_STATUS};
    use serde_json::Value;

    fn payment() -> Payment {
        Payment {
            id: "pay-1".to_string(),
            version: 1,
            key: Some("R1".to_string()),
            amount_planned: Money {
                cent_amount: 10000,
                currency_code: "AUD".to_string(),
                money_type: "centPrecision".to_string(),
                fraction_digits: 2,
            },
            custom: None,
            interface_interactions: Vec::new(),
        }
    }

    fn field<'a>(actions: &'a [UpdateAction], name: &str) -> Option<&'a Value> {
        actions.iter().find_map(|a| match a {
            UpdateAction::SetCustomField { name: n, value } if n == name => Some(value),
            _ => None,
        })
    }

    #[test]
    fn failure_only_writes_the_response() {
        let outcome = ChargeOutcome {
            status: OutcomeStatus::Failure,
            message: String::new(),
            charge_id: None,
            gateway_status: Some(GatewayStatus::Failed),
        };
        let actions = make_payment_actions(&payment(), &MakePaymentRequest::default(), &outcome);
        assert_eq!(actions.len(), 1);
        let text = field(&actions, FIELD_EXTENSION_RESPONSE).and_then(Value::as_str).unwrap();
        assert!(text.contains("Invalid transaction details"));
    }

    #[test]
    fn paid_charge_records_capture_and_key() {
        let request = MakePaymentRequest {
            payment_type: Some("card".to_string()),
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let outcome = ChargeOutcome {
            status: OutcomeStatus::Success,
            message: "ok".to_string(),
            charge_id: Some("ch_1".to_string()),
            gateway_status: Some(GatewayStatus::Paid),
        };
        let actions = make_payment_actions(&payment(), &request, &outcome);
        assert_eq!(field(&actions, FIELD_PAYMENT_STATUS), Some(&Value::from("powerboard-paid")));
        assert_eq!(field(&actions, FIELD_TRANSACTION_ID), Some(&Value::from("ch_1")));
        assert_eq!(field(&actions, FIELD_CAPTURED_AMOUNT), Some(&Value::from(100)));
        assert!(actions.contains(&UpdateAction::SetKey { key: "ch_1".to_string() }));
        let response = field(&actions, FIELD_EXTENSION_RESPONSE).and_then(Value::as_str).unwrap();
        let parsed: Value = serde_json::from_str(response).unwrap();
        assert_eq!(parsed, json!({"orderPaymentStatus": "Paid", "orderStatus": "Complete"}));
    }

    #[test]
    fn authorization_does_not_record_capture() {
        let outcome = ChargeOutcome {
            status: OutcomeStatus::Success,
            message: "ok".to_string(),
            charge_id: Some("0".to_string()),
            gateway_status: Some(GatewayStatus::Authorize),
        };
        let request = MakePaymentRequest {
            transaction_token: Some("ott_1".to_string()),
            ..Default::default()
        };
        let actions = make_payment_actions(&payment(), &request, &outcome);
        assert!(field(&actions, FIELD_CAPTURED_AMOUNT).is_none());
        assert_eq!(field(&actions, FIELD_TRANSACTION_ID), Some(&Value::from("ott_1")));
        assert!(!actions.iter().any(|a| matches!(a, UpdateAction::SetKey { .. })));
    }
}
