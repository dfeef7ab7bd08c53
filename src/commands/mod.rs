use crate::{errors::ServiceError, services::AppServices};
use async_trait::async_trait;
use rust_decimal::Decimal;
use validator::ValidationError;

/// A validated business operation run against the service container.
///
/// Commands check their own input before touching any service, so a validation
/// failure never has side effects.
#[async_trait]
pub trait Command: Send + Sync {
    /// The return type of the command when executed successfully
    type Result;

    async fn execute(&self, services: &AppServices) -> Result<Self::Result, ServiceError>;
}

pub mod payments;
pub mod settlements;

pub(crate) fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() || amount.is_zero() {
        let mut err = ValidationError::new("positive_amount");
        err.message = Some("Amount must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn positive_amount_validation() {
        assert!(validate_positive_amount(&dec!(0.01)).is_ok());
        assert!(validate_positive_amount(&Decimal::ZERO).is_err());
        assert!(validate_positive_amount(&dec!(-5)).is_err());
    }
}
