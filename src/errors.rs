use serde::Serialize;

use crate::models::TicketId;

/// Unified error type for the shop core.
///
/// Validation errors are local and synchronous: a rejected transition leaves
/// the order record untouched and the variant carries a reason suitable for
/// display. Gateway and fulfillment failures wrap the external collaborators'
/// errors without rolling back confirmed state.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Unknown catalog item: {0}")]
    InvalidItem(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Order is incomplete: {0}")]
    IncompleteOrder(String),

    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Fulfillment failed: {0}")]
    FulfillmentError(String),

    #[error("Ticket creation cooldown active, retry in {retry_after_secs}s")]
    CooldownActive { retry_after_secs: u64 },

    #[error("User already has an active ticket: {ticket_id}")]
    ActiveTicketExists { ticket_id: TicketId },

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the message shown to the triggering user.
    /// This is the single source of truth for user-facing reason strings;
    /// external-collaborator errors are summarized so raw HTTP bodies and
    /// connection details never reach the ticket.
    pub fn user_message(&self) -> String {
        match self {
            Self::GatewayError(_) => {
                "Payment provider request failed, please try again".to_string()
            }
            Self::Other(_) => "Internal error".to_string(),
            Self::FulfillmentError(reason) => format!("Delivery failed: {}", reason),
            _ => self.to_string(),
        }
    }

    /// True for rejections the user can fix by changing their input or
    /// simply retrying, as opposed to internal faults.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Self::GatewayError(_) | Self::FulfillmentError(_) | Self::Other(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_gateway_internals() {
        let err = ServiceError::GatewayError("500 {\"token\":\"secret\"}".into());
        assert!(!err.user_message().contains("secret"));

        let err = ServiceError::Other(anyhow::anyhow!("lock poisoned"));
        assert_eq!(err.user_message(), "Internal error");
    }

    #[test]
    fn user_message_keeps_validation_reasons() {
        let err = ServiceError::InvalidIdentity("bad nick".into());
        assert_eq!(err.user_message(), "Invalid identity: bad nick");

        let err = ServiceError::CooldownActive {
            retry_after_secs: 42,
        };
        assert!(err.user_message().contains("42s"));
    }

    #[test]
    fn fulfillment_reason_is_surfaced() {
        let err = ServiceError::FulfillmentError("connection refused".into());
        assert_eq!(err.user_message(), "Delivery failed: connection refused");
        assert!(!err.is_user_error());
    }
}
