use assert_matches::assert_matches;
use chrono::{Duration, Utc};

use ticketshop::errors::ServiceError;
use ticketshop::models::{TicketId, UserId};
use ticketshop::services::SessionRegistry;

#[test]
fn cooldown_is_reported_before_the_active_ticket() {
    let registry = SessionRegistry::new(60);
    let user = UserId::new("u-1");
    let now = Utc::now();

    registry.try_reserve(&user, now).unwrap();
    registry.bind(&user, TicketId::new("t-1"));

    // Both rejections apply; the cooldown one wins while it lasts.
    assert_matches!(
        registry.try_reserve(&user, now + Duration::seconds(10)),
        Err(ServiceError::CooldownActive {
            retry_after_secs: 50
        })
    );
    assert_matches!(
        registry.try_reserve(&user, now + Duration::seconds(90)),
        Err(ServiceError::ActiveTicketExists { ticket_id }) if ticket_id == TicketId::new("t-1")
    );
}

#[test]
fn cooldown_survives_release() {
    let registry = SessionRegistry::new(60);
    let user = UserId::new("u-1");
    let now = Utc::now();

    registry.try_reserve(&user, now).unwrap();
    registry.bind(&user, TicketId::new("t-1"));
    registry.release(&user);
    assert!(registry.active_ticket(&user).is_none());

    // Closing the ticket does not reset the creation window.
    assert_matches!(
        registry.try_reserve(&user, now + Duration::seconds(30)),
        Err(ServiceError::CooldownActive { .. })
    );
    registry
        .try_reserve(&user, now + Duration::seconds(61))
        .unwrap();
}

#[test]
fn zero_cooldown_only_enforces_the_active_ticket() {
    let registry = SessionRegistry::new(0);
    let user = UserId::new("u-1");
    let now = Utc::now();

    registry.try_reserve(&user, now).unwrap();
    registry.try_reserve(&user, now).unwrap();

    registry.bind(&user, TicketId::new("t-1"));
    assert_matches!(
        registry.try_reserve(&user, now),
        Err(ServiceError::ActiveTicketExists { .. })
    );
}
