use crate::commerce::{CommercePlatform, Customer, Order};
use crate::domain::payment::{Payment, UpdateAction};
use crate::error::{CommerceError, ConnectorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDirective {
    Refetch,
    GiveUp,
    FailNow,
}

pub fn attempt_limit(policy: &RetryPolicy) -> u32 {
    policy.max_attempts.max(1)
}

pub fn classify_write_error(error: &CommerceError, attempt: u32, policy: &RetryPolicy) -> RetryDirective {
    if !error.is_conflict() {
        RetryDirective::FailNow
    } else if attempt < attempt_limit(policy) {
        RetryDirective::Refetch
    } else {
        RetryDirective::GiveUp
    }
}

/// A platform record updated under optimistic concurrency.
#[async_trait::async_trait]
pub trait Versioned: Clone + Send + Sync {
    const KIND: &'static str;

    fn id(&self) -> &str;

    async fn refetch(&self, commerce: &dyn CommercePlatform) -> Result<Option<Self>, CommerceError>;

    async fn write(&self, commerce: &dyn CommercePlatform, actions: &[UpdateAction]) -> Result<Self, CommerceError>;
}

#[async_trait::async_trait]
impl Versioned for Payment {
    const KIND: &'static str = "payment";

    fn id(&self) -> &str {
        &self.id
    }

    async fn refetch(&self, commerce: &dyn CommercePlatform) -> Result<Option<Self>, CommerceError> {
        commerce.get_payment(&self.id).await
    }

    async fn write(&self, commerce: &dyn CommercePlatform, actions: &[UpdateAction]) -> Result<Self, CommerceError> {
        commerce.update_payment(&self.id, self.version, actions).await
    }
}

#[async_trait::async_trait]
impl Versioned for Order {
    const KIND: &'static str = "order";

    fn id(&self) -> &str {
        &self.id
    }

    async fn refetch(&self, commerce: &dyn CommercePlatform) -> Result<Option<Self>, CommerceError> {
        commerce.get_order(&self.id).await
    }

    async fn write(&self, commerce: &dyn CommercePlatform, actions: &[UpdateAction]) -> Result<Self, CommerceError> {
        commerce.update_order(&self.id, self.version, actions).await
    }
}

#[async_trait::async_trait]
impl Versioned for Customer {
    const KIND: &'static str = "customer";

    fn id(&self) -> &str {
        &self.id
    }

    async fn refetch(&self, commerce: &dyn CommercePlatform) -> Result<Option<Self>, CommerceError> {
        commerce.get_customer(&self.id).await
    }

    async fn write(&self, commerce: &dyn CommercePlatform, actions: &[UpdateAction]) -> Result<Self, CommerceError> {
        commerce.update_customer(&self.id, self.version, actions).await
    }
}

/// Writes the actions `build` derives from the current record, re-reading
/// the record and rebuilding on every version conflict. An empty action list
/// means there is nothing to write and returns the record unchanged.
pub async fn update_with_retry<T, F>(
    commerce: &dyn CommercePlatform,
    policy: RetryPolicy,
    current: T,
    mut build: F,
) -> Result<T, ConnectorError>
where
    T: Versioned,
    F: FnMut(&T) -> Vec<UpdateAction> + Send,
{
    let mut resource = current;
    let mut attempt = 1;
    loop {
        let actions = build(&resource);
        if actions.is_empty() {
            return Ok(resource);
        }

        let error = match resource.write(commerce, &actions).await {
            Ok(updated) => return Ok(updated),
            Err(e) => e,
        };
        match classify_write_error(&error, attempt, &policy) {
            RetryDirective::Refetch => {
                let id = resource.id().to_string();
                tracing::warn!(kind = T::KIND, id = %id, attempt, "version conflict, refetching");
                resource = resource
                    .refetch(commerce)
                    .await?
                    .ok_or_else(|| CommerceError::NotFound(format!("{} {id}", T::KIND)))?;
                attempt += 1;
            }
            RetryDirective::GiveUp => {
                tracing::error!(kind = T::KIND, id = resource.id(), attempt, "giving up after version conflicts");
                return Err(ConnectorError::Concurrency(format!("{} {}", T::KIND, resource.id())));
            }
            RetryDirective::FailNow => return Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retried() {
        let policy = RetryPolicy { max_attempts: 3 };
        let conflict = CommerceError::ConcurrentModification { current_version: Some(4) };
        let other = CommerceError::Api {
            status: 400,
            message: "bad".to_string(),
        };
        assert_eq!(classify_write_error(&conflict, 1, &policy), RetryDirective::Refetch);
        assert_eq!(classify_write_error(&conflict, 3, &policy), RetryDirective::GiveUp);
        assert_eq!(classify_write_error(&other, 1, &policy), RetryDirective::FailNow);
    }

    #[test]
    fn zero_attempts_still_writes_once() {
        assert_eq!(attempt_limit(&RetryPolicy { max_attempts: 0 }), 1);
    }
}
