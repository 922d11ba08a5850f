use crate::commerce::{CommercePlatform, CustomObject, Customer, Order};
use crate::domain::payment::{CustomFields, Payment, UpdateAction};
use crate::error::CommerceError;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Store {
    payments: HashMap<String, Payment>,
    orders: HashMap<String, (Order, Vec<String>)>,
    customers: HashMap<String, Customer>,
    objects: HashMap<(String, String), CustomObject>,
    conflicts: HashMap<String, u32>,
}

/// Versioned in-process stand-in for the commerce platform, used by the
/// test suite and for local runs without platform credentials.
#[derive(Default)]
pub struct InMemoryCommerce {
    store: Mutex<Store>,
}

impl InMemoryCommerce {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn insert_payment(&self, payment: Payment) {
        self.lock().payments.insert(payment.id.clone(), payment);
    }

    pub fn insert_order(&self, order: Order, payment_ids: &[&str]) {
        let ids = payment_ids.iter().map(ToString::to_string).collect();
        self.lock().orders.insert(order.id.clone(), (order, ids));
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.lock().customers.insert(customer.id.clone(), customer);
    }

    pub fn insert_custom_object(&self, object: CustomObject) {
        self.lock()
            .objects
            .insert((object.container.clone(), object.key.clone()), object);
    }

    pub fn payment(&self, id: &str) -> Option<Payment> {
        self.lock().payments.get(id).cloned()
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.lock().orders.get(id).map(|(o, _)| o.clone())
    }

    pub fn customer(&self, id: &str) -> Option<Customer> {
        self.lock().customers.get(id).cloned()
    }

    pub fn custom_object(&self, container: &str, key: &str) -> Option<CustomObject> {
        self.lock()
            .objects
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    /// The next `times` updates of resource `id` lose a race against a
    /// concurrent writer that bumps the stored version.
    pub fn inject_conflicts(&self, id: &str, times: u32) {
        self.lock().conflicts.insert(id.to_string(), times);
    }
}

fn take_conflict(store: &mut Store, id: &str) -> bool {
    match store.conflicts.get_mut(id) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

fn check_version(current: i64, expected: i64) -> Result<(), CommerceError> {
    if current != expected {
        return Err(CommerceError::ConcurrentModification {
            current_version: Some(current),
        });
    }
    Ok(())
}

fn apply_custom(custom: &mut Option<CustomFields>, action: &UpdateAction) -> Result<bool, CommerceError> {
    match action {
        UpdateAction::SetCustomField { name, value } => {
            let fields = &mut custom
                .as_mut()
                .ok_or_else(|| CommerceError::Api {
                    status: 400,
                    message: "resource has no custom type".to_string(),
                })?
                .fields;
            if value.is_null() {
                fields.remove(name);
            } else {
                fields.insert(name.clone(), value.clone());
            }
            Ok(true)
        }
        UpdateAction::SetCustomType { type_ref, fields } => {
            *custom = Some(CustomFields {
                type_ref: Some(type_ref.clone()),
                fields: fields.clone().unwrap_or_default(),
            });
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn unsupported(action: &UpdateAction, resource: &str) -> CommerceError {
    CommerceError::Api {
        status: 400,
        message: format!("action {action:?} is not valid for a {resource}"),
    }
}

#[async_trait::async_trait]
impl CommercePlatform for InMemoryCommerce {
    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, CommerceError> {
        Ok(self.payment(id))
    }

    async fn get_payment_by_key(&self, key: &str) -> Result<Option<Payment>, CommerceError> {
        Ok(self
            .lock()
            .payments
            .values()
            .find(|p| p.key.as_deref() == Some(key))
            .cloned())
    }

    async fn update_payment(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Payment, CommerceError> {
        let mut store = self.lock();
        let conflict = take_conflict(&mut store, id);
        let taken_keys: Vec<String> = store
            .payments
            .values()
            .filter(|p| p.id != id)
            .filter_map(|p| p.key.clone())
            .collect();
        let payment = store
            .payments
            .get_mut(id)
            .ok_or_else(|| CommerceError::NotFound(format!("payment {id}")))?;
        if conflict {
            payment.version += 1;
        }
        check_version(payment.version, version)?;

        let mut updated = payment.clone();
        for action in actions {
            if apply_custom(&mut updated.custom, action)? {
                continue;
            }
            match action {
                UpdateAction::SetKey { key } => {
                    if updated.key.as_deref() == Some(key.as_str()) {
                        return Err(CommerceError::Api {
                            status: 400,
                            message: format!("payment key is already '{key}'"),
                        });
                    }
                    if taken_keys.contains(key) {
                        return Err(CommerceError::Api {
                            status: 400,
                            message: format!("a payment with key '{key}' already exists"),
                        });
                    }
                    updated.key = Some(key.clone());
                }
                UpdateAction::AddInterfaceInteraction { type_ref, fields } => {
                    updated
                        .interface_interactions
                        .push(json!({ "type": type_ref, "fields": fields }));
                }
                other => return Err(unsupported(other, "payment")),
            }
        }
        updated.version += 1;
        *payment = updated.clone();
        Ok(updated)
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, CommerceError> {
        Ok(self.order(id))
    }

    async fn find_order_by_payment(&self, payment_id: &str) -> Result<Option<Order>, CommerceError> {
        Ok(self
            .lock()
            .orders
            .values()
            .find(|(_, ids)| ids.iter().any(|p| p == payment_id))
            .map(|(o, _)| o.clone()))
    }

    async fn update_order(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Order, CommerceError> {
        let mut store = self.lock();
        let conflict = take_conflict(&mut store, id);
        let (order, _) = store
            .orders
            .get_mut(id)
            .ok_or_else(|| CommerceError::NotFound(format!("order {id}")))?;
        if conflict {
            order.version += 1;
        }
        check_version(order.version, version)?;

        let mut updated = order.clone();
        for action in actions {
            match action {
                UpdateAction::ChangePaymentState { payment_state } => {
                    updated.payment_state = Some(payment_state.as_str().to_string());
                }
                UpdateAction::ChangeOrderState { order_state } => {
                    updated.order_state = Some(order_state.as_str().to_string());
                }
                other => return Err(unsupported(other, "order")),
            }
        }
        updated.version += 1;
        *order = updated.clone();
        Ok(updated)
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>, CommerceError> {
        Ok(self.customer(id))
    }

    async fn update_customer(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Customer, CommerceError> {
        let mut store = self.lock();
        let conflict = take_conflict(&mut store, id);
        let customer = store
            .customers
            .get_mut(id)
            .ok_or_else(|| CommerceError::NotFound(format!("customer {id}")))?;
        if conflict {
            customer.version += 1;
        }
        check_version(customer.version, version)?;

        let mut updated = customer.clone();
        for action in actions {
            if !apply_custom(&mut updated.custom, action)? {
                return Err(unsupported(action, "customer"));
            }
        }
        updated.version += 1;
        *customer = updated.clone();
        Ok(updated)
    }

    async fn get_custom_object(&self, container: &str, key: &str) -> Result<Option<CustomObject>, CommerceError> {
        Ok(self.custom_object(container, key))
    }

    async fn list_custom_objects(&self, container: &str) -> Result<Vec<CustomObject>, CommerceError> {
        let mut objects: Vec<CustomObject> = self
            .lock()
            .objects
            .values()
            .filter(|o| o.container == container)
            .cloned()
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn upsert_custom_object(&self, container: &str, key: &str, value: Value) -> Result<CustomObject, CommerceError> {
        let now = Utc::now();
        let mut store = self.lock();
        let entry = store
            .objects
            .entry((container.to_string(), key.to_string()))
            .or_insert_with(|| CustomObject {
                container: container.to_string(),
                key: key.to_string(),
                value: Value::Null,
                version: 0,
                created_at: Some(now),
                last_modified_at: None,
            });
        entry.value = value;
        entry.version += 1;
        entry.last_modified_at = Some(now);
        Ok(entry.clone())
    }

    async fn delete_custom_object(&self, container: &str, key: &str) -> Result<bool, CommerceError> {
        Ok(self
            .lock()
            .objects
            .remove(&(container.to_string(), key.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Money;
    use serde_json::Map;

    fn payment(id: &str) -> Payment {
        Payment {
            id: id.to_string(),
            version: 1,
            key: None,
            amount_planned: Money {
                cent_amount: 1000,
                currency_code: "AUD".to_string(),
                money_type: "centPrecision".to_string(),
                fraction_digits: 2,
            },
            custom: Some(CustomFields {
                type_ref: None,
                fields: Map::new(),
            }),
            interface_interactions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let commerce = InMemoryCommerce::new();
        commerce.insert_payment(payment("p1"));
        let action = UpdateAction::set_field("X", "1");
        commerce.update_payment("p1", 1, &[action.clone()]).await.unwrap();
        let err = commerce.update_payment("p1", 1, &[action]).await.unwrap_err();
        assert!(matches!(err, CommerceError::ConcurrentModification { current_version: Some(2) }));
    }

    #[tokio::test]
    async fn rejects_unchanged_key() {
        let commerce = InMemoryCommerce::new();
        let mut p = payment("p1");
        p.key = Some("R1".to_string());
        commerce.insert_payment(p);
        let err = commerce
            .update_payment("p1", 1, &[UpdateAction::SetKey { key: "R1".to_string() }])
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn null_value_removes_field() {
        let commerce = InMemoryCommerce::new();
        commerce.insert_payment(payment("p1"));
        let p = commerce
            .update_payment("p1", 1, &[UpdateAction::set_field("X", "1")])
            .await
            .unwrap();
        assert_eq!(p.field_str("X"), Some("1"));
        let p = commerce
            .update_payment("p1", 2, &[UpdateAction::clear_field("X")])
            .await
            .unwrap();
        assert_eq!(p.field("X"), None);
    }

    #[tokio::test]
    async fn only_one_delete_wins() {
        let commerce = InMemoryCommerce::new();
        commerce
            .upsert_custom_object("c", "k", json!({"a": 1}))
            .await
            .unwrap();
        assert!(commerce.delete_custom_object("c", "k").await.unwrap());
        assert!(!commerce.delete_custom_object("c", "k").await.unwrap());
    }
}
