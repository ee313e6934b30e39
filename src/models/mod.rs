use std::fmt;

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod order;

pub use catalog::{Catalog, CatalogItem};
pub use order::{FulfillmentState, Order, OrderStatus, PaymentAttempt, PaymentState};

/// Opaque handle for the buyer, as issued by the chat platform.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle for the private ticket channel scoped to one order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives a channel name for a new ticket from the buyer's username:
/// lowercased, restricted to `[a-z0-9-]`, capped at 90 characters. When
/// nothing of the username survives the filter it falls back to `user`.
pub fn safe_ticket_name(prefix: &str, username: &str) -> String {
    fn sanitize(raw: &str) -> String {
        raw.to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
            .collect()
    }

    let mut user = sanitize(username);
    if user.is_empty() {
        user = "user".to_string();
    }
    format!("{}-{}", sanitize(prefix), user)
        .chars()
        .take(90)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_name_is_filtered_and_capped() {
        assert_eq!(safe_ticket_name("shop", "Wexvit"), "shop-wexvit");
        assert_eq!(safe_ticket_name("shop", "We x!vit_9"), "shop-wexvit9");

        let long = "a".repeat(200);
        assert_eq!(safe_ticket_name("shop", &long).len(), 90);
    }

    #[test]
    fn unmappable_usernames_fall_back_to_user() {
        assert_eq!(safe_ticket_name("zakup", "死"), "zakup-user");
        assert_eq!(safe_ticket_name("shop", "@#$%"), "shop-user");
        assert_eq!(safe_ticket_name("shop", ""), "shop-user");
    }
}
