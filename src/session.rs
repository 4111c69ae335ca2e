use crate::dialog::{DialogState, Role};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Dialog state accumulated over the turns of one phone call.
#[derive(Clone, Debug, PartialEq)]
pub struct CallSession {
    pub call_id: String,
    /// Caller's phone number as reported by the provider
    pub caller_id: String,
    pub state: DialogState,
    pub role: Option<Role>,
    pub location: Option<String>,
    /// Set together with the transition into `Complete`
    pub amount: Option<Decimal>,
    /// Failed attempts at the current question
    pub retry_count: u32,
    pub created_at: OffsetDateTime,
    pub last_activity_at: OffsetDateTime,
}

impl CallSession {
    pub fn new(call_id: &str, caller_id: &str, now: OffsetDateTime) -> Self {
        Self {
            call_id: call_id.to_string(),
            caller_id: caller_id.to_string(),
            state: DialogState::Start,
            role: None,
            location: None,
            amount: None,
            retry_count: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.last_activity_at = now;
    }

    pub fn is_expired(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        now - self.last_activity_at > ttl
    }
}

type Slot = Arc<AsyncMutex<Option<CallSession>>>;

/// Exclusive access to one call's slot. `None` means no session exists yet.
pub type SessionGuard = OwnedMutexGuard<Option<CallSession>>;

/// Per-call session storage. The outer map lock is only held to find or create
/// a slot; each call then has its own async lock, so turns for different calls
/// never wait on each other.
pub struct SessionStore {
    slots: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Enter the critical section for `call_id`; held for a whole turn.
    ///
    /// The slot is claimed while the map is still locked, so the reaper can never
    /// drop a slot between it being handed out and its holder writing to it. If
    /// another turn holds it, the waiter is queued behind that turn and the
    /// reaper's `try_lock` keeps failing until the waiter is done.
    pub async fn lock(&self, call_id: &str) -> SessionGuard {
        let slot = {
            let mut slots = self.slots.lock();
            let slot = slots
                .entry(call_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
                .clone();
            match slot.clone().try_lock_owned() {
                Ok(guard) => return guard,
                Err(_) => slot,
            }
        };
        slot.lock_owned().await
    }

    pub async fn get(&self, call_id: &str) -> Option<CallSession> {
        let slot = self.slots.lock().get(call_id).cloned()?;
        let guard = slot.lock().await;
        guard.clone()
    }

    pub async fn upsert(&self, session: CallSession) {
        let mut guard = self.lock(&session.call_id).await;
        *guard = Some(session);
    }

    pub async fn delete(&self, call_id: &str) -> Option<CallSession> {
        let slot = self.slots.lock().remove(call_id)?;
        let mut guard = slot.lock().await;
        guard.take()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Drop sessions idle for longer than the TTL, terminal ones included.
    /// Slots that are locked by an in-flight turn are left alone.
    pub fn evict_expired(&self, now: OffsetDateTime) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|call_id, slot| match slot.try_lock() {
            Ok(guard) => match guard.as_ref() {
                Some(session) if session.is_expired(now, self.ttl) => {
                    debug!(call_id=%call_id, state=?session.state, "evicting idle session");
                    false
                }
                Some(_) => true,
                // a slot someone created but never filled
                None => false,
            },
            Err(_) => true,
        });
        before - slots.len()
    }

    /// Periodically evict idle sessions until `true` is sent on the returned channel.
    pub fn start_reaper(self: &Arc<Self>, every: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = store.evict_expired(OffsetDateTime::now_utc());
                        if evicted > 0 {
                            info!(evicted, remaining = store.len(), "session reaper pass");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("session reaper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
