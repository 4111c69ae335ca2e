use crate::dialog::{self, DialogState, Outcome, TurnHint, TurnInput};
use crate::error::AppError;
use crate::prompts::{self, Reply};
use crate::recorder::LeadRecorder;
use crate::session::{CallSession, SessionGuard, SessionStore};

use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// One Gather callback from the provider.
#[derive(Clone, Debug, Default)]
pub struct DialogTurn {
    pub call_id: String,
    pub caller_id: Option<String>,
    pub input: TurnInput,
    pub hint: TurnHint,
}

/// Drives calls through the dialog. Every event runs inside the call's
/// exclusive section, so redelivered or racing events see each other's effects.
pub struct DialogEngine {
    store: Arc<SessionStore>,
    recorder: LeadRecorder,
    max_retries: u32,
}

impl DialogEngine {
    pub fn new(store: Arc<SessionStore>, recorder: LeadRecorder, max_retries: u32) -> Self {
        Self {
            store,
            recorder,
            max_retries,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub async fn call_initiated(&self, call_id: &str, caller_id: &str) -> Result<Reply, AppError> {
        if call_id.is_empty() || caller_id.is_empty() {
            return Err(AppError::BadRequest("missing call or caller id"));
        }
        let now = OffsetDateTime::now_utc();
        let mut slot = self.store.lock(call_id).await;
        self.drop_if_expired(&mut slot, now);

        match slot.as_mut() {
            Some(session) if session.state.is_terminal() => {
                debug!(call_id, state=?session.state, error=%AppError::DuplicateEvent, "ignoring start");
                Ok(Reply::Ignored)
            }
            Some(session) => {
                // provider retried the start webhook; say the same thing again
                session.touch(now);
                Ok(prompts::render(session, &Outcome::Asked))
            }
            None => {
                let session = slot.insert(CallSession::new(call_id, caller_id, now));
                session.state = DialogState::AwaitRole;
                info!(call_id, caller_id, "call started");
                Ok(prompts::render(session, &Outcome::Asked))
            }
        }
    }

    pub async fn dialog_turn(&self, turn: DialogTurn) -> Result<Reply, AppError> {
        if turn.call_id.is_empty() {
            return Err(AppError::BadRequest("missing call id"));
        }
        let now = OffsetDateTime::now_utc();
        let mut slot = self.store.lock(&turn.call_id).await;
        self.drop_if_expired(&mut slot, now);

        let session = match slot.as_mut() {
            Some(session) => session,
            None => {
                // evicted or never seen: begin again from the top
                let caller_id = turn
                    .caller_id
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .ok_or(AppError::BadRequest("missing caller id"))?;
                warn!(call_id=%turn.call_id, "turn for unknown call; starting over");
                let session = slot.insert(CallSession::new(&turn.call_id, caller_id, now));
                session.state = DialogState::AwaitRole;
                return Ok(prompts::render(session, &Outcome::Asked));
            }
        };

        if !session.state.is_terminal() && turn.hint.is_stale_for(session) {
            debug!(call_id=%turn.call_id, hint=?turn.hint, state=?session.state, "stale turn");
            return Ok(prompts::render(session, &Outcome::Asked));
        }

        session.touch(now);
        let from = session.state;
        let outcome = match dialog::advance(session, &turn.input, self.max_retries) {
            Ok(outcome) => outcome,
            Err(AppError::DuplicateEvent) => {
                debug!(call_id=%turn.call_id, state=?session.state, "ignoring event for finished call");
                return Ok(Reply::Ignored);
            }
            Err(e) => return Err(e),
        };
        debug!(call_id=%turn.call_id, from=?from, to=?session.state, outcome=?outcome, "turn");

        match &outcome {
            Outcome::Captured => match self.recorder.record(session).await {
                Ok(_) => Ok(prompts::render(session, &outcome)),
                Err(e) => {
                    // the session stays Complete so a redelivery cannot write again
                    error!(call_id=%turn.call_id, error=%e, "lead not recorded");
                    Ok(prompts::record_failed())
                }
            },
            Outcome::Abandoned(reason) => {
                info!(call_id=%turn.call_id, from=?from, reason=%reason, "call abandoned");
                Ok(prompts::render(session, &outcome))
            }
            Outcome::Asked | Outcome::Reasked(_) => Ok(prompts::render(session, &outcome)),
        }
    }

    /// A session idle past the TTL is gone even if the reaper has not run yet.
    fn drop_if_expired(&self, slot: &mut SessionGuard, now: OffsetDateTime) {
        if let Some(session) = slot.as_ref() {
            if session.is_expired(now, self.store.ttl()) {
                debug!(call_id=%session.call_id, state=?session.state, "session expired before reaper pass");
                **slot = None;
            }
        }
    }

    /// Provider reported the call over. Unfinished sessions are dropped right away;
    /// finished ones stay until the reaper so late redeliveries are still ignored.
    pub async fn call_ended(&self, call_id: &str) -> bool {
        let mut slot = self.store.lock(call_id).await;
        match slot.as_ref() {
            Some(session) if !session.state.is_terminal() => {
                info!(call_id, state=?session.state, "caller hung up mid-dialog");
                // the emptied slot is dropped by the next reaper pass
                slot.take().is_some()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::Role;
    use crate::leads::{LeadGateway, LeadRecord, MemoryLeadStore};
    use crate::recorder::tests::BrokenGateway;
    use rust_decimal::Decimal;
    use std::time::Duration;

    const CALLER: &str = "+15551234567";

    fn engine_with(gateway: Arc<dyn LeadGateway>) -> DialogEngine {
        let store = Arc::new(SessionStore::new(Duration::from_secs(300)));
        let recorder = LeadRecorder::new(gateway, Duration::from_secs(1));
        DialogEngine::new(store, recorder, 3)
    }

    fn engine() -> (DialogEngine, Arc<MemoryLeadStore>) {
        let leads = Arc::new(MemoryLeadStore::new());
        (engine_with(leads.clone()), leads)
    }

    fn turn(call_id: &str, input: TurnInput) -> DialogTurn {
        DialogTurn {
            call_id: call_id.to_string(),
            caller_id: Some(CALLER.to_string()),
            input,
            hint: TurnHint::default(),
        }
    }

    async fn state_of(engine: &DialogEngine, call_id: &str) -> Option<DialogState> {
        engine.store().get(call_id).await.map(|s| s.state)
    }

    fn is_prompt(reply: &Reply) -> bool {
        matches!(reply, Reply::Prompt { .. })
    }

    #[tokio::test]
    async fn seller_call_end_to_end() {
        let (engine, leads) = engine();

        let reply = engine.call_initiated("C1", CALLER).await.unwrap();
        assert!(is_prompt(&reply));
        assert_eq!(state_of(&engine, "C1").await, Some(DialogState::AwaitRole));

        engine.dialog_turn(turn("C1", TurnInput::digits("1"))).await.unwrap();
        assert_eq!(
            state_of(&engine, "C1").await,
            Some(DialogState::AwaitSellerLocation)
        );

        engine
            .dialog_turn(turn("C1", TurnInput::speech("Austin Texas")))
            .await
            .unwrap();
        assert_eq!(
            state_of(&engine, "C1").await,
            Some(DialogState::AwaitSellerPrice)
        );

        let reply = engine
            .dialog_turn(turn("C1", TurnInput::digits("350000")))
            .await
            .unwrap();
        assert!(matches!(reply, Reply::EndCall { .. }));
        assert_eq!(state_of(&engine, "C1").await, Some(DialogState::Complete));

        let recorded = leads.leads();
        assert_eq!(recorded.len(), 1);
        match &recorded[0] {
            LeadRecord::Seller {
                phone_number,
                location,
                asking_price,
                ..
            } => {
                assert_eq!(phone_number, CALLER);
                assert_eq!(location, "Austin Texas");
                assert_eq!(*asking_price, Decimal::from(350_000));
            }
            other => panic!("expected a seller lead, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_final_turn_records_once() {
        let (engine, leads) = engine();
        engine.call_initiated("C1", CALLER).await.unwrap();
        engine.dialog_turn(turn("C1", TurnInput::digits("2"))).await.unwrap();
        engine
            .dialog_turn(turn("C1", TurnInput::speech("Boise Idaho")))
            .await
            .unwrap();

        let last = turn("C1", TurnInput::speech("two million"));
        let (a, b) = tokio::join!(
            engine.dialog_turn(last.clone()),
            engine.dialog_turn(last.clone())
        );
        let replies = [a.unwrap(), b.unwrap()];
        assert_eq!(replies.iter().filter(|r| **r == Reply::Ignored).count(), 1);

        // and once more after the fact
        assert_eq!(engine.dialog_turn(last).await.unwrap(), Reply::Ignored);

        let recorded = leads.leads();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].amount(), Decimal::from(2_000_000));
        assert!(matches!(recorded[0], LeadRecord::Buyer { .. }));
    }

    #[tokio::test]
    async fn retries_exhausted_abandon_without_a_lead() {
        let (engine, leads) = engine();
        engine.call_initiated("C1", CALLER).await.unwrap();
        engine.dialog_turn(turn("C1", TurnInput::digits("1"))).await.unwrap();
        engine
            .dialog_turn(turn("C1", TurnInput::speech("Tulsa")))
            .await
            .unwrap();

        for _ in 0..3 {
            let reply = engine
                .dialog_turn(turn("C1", TurnInput::speech("I'm not sure")))
                .await
                .unwrap();
            assert!(is_prompt(&reply));
        }
        let reply = engine
            .dialog_turn(turn("C1", TurnInput::speech("banana")))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::EndCall {
                message: prompts::GAVE_UP.to_string()
            }
        );
        assert_eq!(state_of(&engine, "C1").await, Some(DialogState::Abandoned));
        assert!(leads.leads().is_empty());

        let reply = engine
            .dialog_turn(turn("C1", TurnInput::digits("100000")))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Ignored);
        assert!(leads.leads().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_still_completes() {
        let engine = engine_with(Arc::new(BrokenGateway));
        engine.call_initiated("C1", CALLER).await.unwrap();
        engine.dialog_turn(turn("C1", TurnInput::digits("1"))).await.unwrap();
        engine
            .dialog_turn(turn("C1", TurnInput::speech("Miami")))
            .await
            .unwrap();
        let reply = engine
            .dialog_turn(turn("C1", TurnInput::digits("90000")))
            .await
            .unwrap();
        assert_eq!(reply, prompts::record_failed());
        assert_eq!(state_of(&engine, "C1").await, Some(DialogState::Complete));

        let again = engine
            .dialog_turn(turn("C1", TurnInput::digits("90000")))
            .await
            .unwrap();
        assert_eq!(again, Reply::Ignored);
    }

    #[tokio::test]
    async fn concurrent_calls_do_not_mix() {
        let (engine, leads) = engine();
        let engine = Arc::new(engine);

        let calls = (0..10).map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let call_id = format!("C{i}");
                let (role_key, city) = if i % 2 == 0 {
                    ("1", format!("Seller City {i}"))
                } else {
                    ("2", format!("Buyer City {i}"))
                };
                engine.call_initiated(&call_id, CALLER).await.unwrap();
                engine
                    .dialog_turn(turn(&call_id, TurnInput::digits(role_key)))
                    .await
                    .unwrap();
                engine
                    .dialog_turn(turn(&call_id, TurnInput::speech(&city)))
                    .await
                    .unwrap();
                engine
                    .dialog_turn(turn(&call_id, TurnInput::digits(&format!("{}000", i + 1))))
                    .await
                    .unwrap();
            })
        });
        for call in calls {
            call.await.unwrap();
        }

        let recorded = leads.leads();
        assert_eq!(recorded.len(), 10);
        for lead in recorded {
            let n: u64 = lead
                .location()
                .rsplit(' ')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap();
            assert_eq!(lead.amount(), Decimal::from((n + 1) * 1000));
            let expected_seller = n % 2 == 0;
            assert_eq!(matches!(lead, LeadRecord::Seller { .. }), expected_seller);
        }
    }

    #[tokio::test]
    async fn stale_hint_does_not_mutate() {
        let (engine, _) = engine();
        engine.call_initiated("C1", CALLER).await.unwrap();
        engine.dialog_turn(turn("C1", TurnInput::digits("1"))).await.unwrap();

        // redelivered role answer, tagged with the prompt it answered
        let mut stale = turn("C1", TurnInput::digits("2"));
        stale.hint = TurnHint {
            state: Some(DialogState::AwaitRole),
            attempt: Some(0),
        };
        let reply = engine.dialog_turn(stale).await.unwrap();
        match reply {
            Reply::Prompt { hint, .. } => {
                assert_eq!(hint.state, Some(DialogState::AwaitSellerLocation))
            }
            other => panic!("unexpected reply {other:?}"),
        }
        let session = engine.store().get("C1").await.unwrap();
        assert_eq!(session.role, Some(Role::Seller));
        assert_eq!(session.retry_count, 0);
    }

    #[tokio::test]
    async fn evicted_call_starts_over() {
        let (engine, leads) = engine();
        engine.call_initiated("C1", CALLER).await.unwrap();
        engine.dialog_turn(turn("C1", TurnInput::digits("1"))).await.unwrap();

        let later = OffsetDateTime::now_utc() + Duration::from_secs(301);
        assert_eq!(engine.store().evict_expired(later), 1);
        assert!(engine.store().get("C1").await.is_none());

        let reply = engine
            .dialog_turn(turn("C1", TurnInput::speech("Austin Texas")))
            .await
            .unwrap();
        match reply {
            Reply::Prompt { text, hint, .. } => {
                assert!(text.starts_with(prompts::GREETING));
                assert_eq!(hint.state, Some(DialogState::AwaitRole));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        let session = engine.store().get("C1").await.unwrap();
        assert_eq!(session.location, None);
        assert_eq!(session.role, None);
        assert!(leads.leads().is_empty());
    }

    #[tokio::test]
    async fn idle_session_restarts_without_waiting_for_reaper() {
        let (engine, leads) = engine();
        let mut stale = CallSession::new(
            "C1",
            CALLER,
            OffsetDateTime::now_utc() - Duration::from_secs(400),
        );
        stale.state = DialogState::AwaitSellerLocation;
        stale.role = Some(Role::Seller);
        engine.store().upsert(stale).await;

        let reply = engine
            .dialog_turn(turn("C1", TurnInput::speech("Austin Texas")))
            .await
            .unwrap();
        match reply {
            Reply::Prompt { text, hint, .. } => {
                assert!(text.starts_with(prompts::GREETING));
                assert_eq!(hint.state, Some(DialogState::AwaitRole));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        let session = engine.store().get("C1").await.unwrap();
        assert_eq!(session.state, DialogState::AwaitRole);
        assert_eq!(session.role, None);
        assert_eq!(session.location, None);
        assert!(leads.leads().is_empty());
    }

    #[tokio::test]
    async fn idle_finished_call_can_start_again() {
        let (engine, _) = engine();
        let mut done = CallSession::new(
            "C1",
            CALLER,
            OffsetDateTime::now_utc() - Duration::from_secs(400),
        );
        done.state = DialogState::Abandoned;
        engine.store().upsert(done).await;

        let reply = engine.call_initiated("C1", CALLER).await.unwrap();
        assert!(is_prompt(&reply));
        assert_eq!(state_of(&engine, "C1").await, Some(DialogState::AwaitRole));
    }

    #[tokio::test]
    async fn hang_up_drops_only_unfinished_sessions() {
        let (engine, _) = engine();
        engine.call_initiated("C1", CALLER).await.unwrap();
        assert!(engine.call_ended("C1").await);
        assert!(engine.store().get("C1").await.is_none());

        engine.call_initiated("C2", CALLER).await.unwrap();
        engine.dialog_turn(turn("C2", TurnInput::digits("1"))).await.unwrap();
        engine.dialog_turn(turn("C2", TurnInput::speech("Reno"))).await.unwrap();
        engine.dialog_turn(turn("C2", TurnInput::digits("1000"))).await.unwrap();
        assert!(!engine.call_ended("C2").await);
        assert_eq!(state_of(&engine, "C2").await, Some(DialogState::Complete));

        assert!(!engine.call_ended("nobody").await);
    }

    #[tokio::test]
    async fn repeated_start_is_idempotent() {
        let (engine, _) = engine();
        let first = engine.call_initiated("C1", CALLER).await.unwrap();
        let second = engine.call_initiated("C1", CALLER).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(state_of(&engine, "C1").await, Some(DialogState::AwaitRole));
    }

    #[tokio::test]
    async fn missing_identity_is_rejected() {
        let (engine, _) = engine();
        assert_eq!(
            engine.call_initiated("C1", "").await,
            Err(AppError::BadRequest("missing call or caller id"))
        );
        let mut t = turn("C2", TurnInput::digits("1"));
        t.caller_id = None;
        assert_eq!(
            engine.dialog_turn(t).await,
            Err(AppError::BadRequest("missing caller id"))
        );
    }
}
