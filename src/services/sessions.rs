use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::{
    errors::ServiceError,
    models::{TicketId, UserId},
};

/// In-memory bookkeeping enforcing "one active ticket per user" plus a
/// creation cooldown. No I/O; per-user serialization comes from the DashMap
/// entry API. Entries live for the ticket's lifetime, not the process's:
/// `release` must run exactly once per order destruction, error paths
/// included.
pub struct SessionRegistry {
    cooldown: Duration,
    active: DashMap<UserId, TicketId>,
    last_reservation: DashMap<UserId, DateTime<Utc>>,
}

impl SessionRegistry {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs as i64),
            active: DashMap::new(),
            last_reservation: DashMap::new(),
        }
    }

    /// Checks the cooldown window and the one-active-ticket rule, recording
    /// the reservation timestamp only on success. The cooldown check comes
    /// first and a rejection never consumes the window, matching the order
    /// creation flow's user-visible behavior.
    /// The entry lock on the reservation map is the per-user-key
    /// serialization point: two concurrent reservations for one user cannot
    /// both pass the checks.
    #[instrument(skip(self), fields(user = %user))]
    pub fn try_reserve(&self, user: &UserId, now: DateTime<Utc>) -> Result<(), ServiceError> {
        match self.last_reservation.entry(user.clone()) {
            Entry::Occupied(mut entry) => {
                let elapsed = now - *entry.get();
                if elapsed < self.cooldown {
                    let retry_after = self.cooldown - elapsed;
                    let retry_after_secs =
                        (retry_after.num_milliseconds() as f64 / 1000.0).ceil() as u64;
                    debug!(retry_after_secs, "reservation rejected by cooldown");
                    return Err(ServiceError::CooldownActive { retry_after_secs });
                }
                self.check_no_active_ticket(user)?;
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                self.check_no_active_ticket(user)?;
                entry.insert(now);
            }
        }
        Ok(())
    }

    fn check_no_active_ticket(&self, user: &UserId) -> Result<(), ServiceError> {
        if let Some(existing) = self.active.get(user) {
            return Err(ServiceError::ActiveTicketExists {
                ticket_id: existing.clone(),
            });
        }
        Ok(())
    }

    /// Records the active user -> ticket mapping after the ticket channel
    /// exists.
    pub fn bind(&self, user: &UserId, ticket: TicketId) {
        self.active.insert(user.clone(), ticket);
    }

    /// Removes the mapping if present. Idempotent.
    pub fn release(&self, user: &UserId) {
        self.active.remove(user);
    }

    /// Ticket currently owned by `user`, if any.
    pub fn active_ticket(&self, user: &UserId) -> Option<TicketId> {
        self.active.get(user).map(|entry| entry.clone())
    }
}
