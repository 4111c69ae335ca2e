//! Question-by-question dialog: role, then location, then a money figure.
//!
//! `advance` is the whole transition table. It only touches the session it is
//! handed; locking, persistence and rendering live in the engine.

use crate::currency;
use crate::error::AppError;
use crate::session::CallSession;

use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogState {
    Start,
    AwaitRole,
    AwaitSellerLocation,
    AwaitSellerPrice,
    AwaitBuyerLocation,
    AwaitBuyerBudget,
    Complete,
    Abandoned,
}

impl DialogState {
    const ALL: [DialogState; 8] = [
        DialogState::Start,
        DialogState::AwaitRole,
        DialogState::AwaitSellerLocation,
        DialogState::AwaitSellerPrice,
        DialogState::AwaitBuyerLocation,
        DialogState::AwaitBuyerBudget,
        DialogState::Complete,
        DialogState::Abandoned,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, DialogState::Complete | DialogState::Abandoned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DialogState::Start => "start",
            DialogState::AwaitRole => "await_role",
            DialogState::AwaitSellerLocation => "await_seller_location",
            DialogState::AwaitSellerPrice => "await_seller_price",
            DialogState::AwaitBuyerLocation => "await_buyer_location",
            DialogState::AwaitBuyerBudget => "await_buyer_budget",
            DialogState::Complete => "complete",
            DialogState::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialogState {
    type Err = BadHint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DialogState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| BadHint(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Seller,
    Buyer,
}

/// What the caller gave us on one turn. Blank values are treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnInput {
    pub digits: Option<String>,
    pub speech: Option<String>,
}

impl TurnInput {
    pub fn new(digits: Option<String>, speech: Option<String>) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            digits: clean(digits),
            speech: clean(speech),
        }
    }

    pub fn digits(digits: &str) -> Self {
        Self::new(Some(digits.to_string()), None)
    }

    pub fn speech(speech: &str) -> Self {
        Self::new(None, Some(speech.to_string()))
    }

    /// Keypad entry wins over the transcript when both are present.
    fn raw_amount(&self) -> Option<&str> {
        self.digits.as_deref().or(self.speech.as_deref())
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unreadable turn hint '{0}'")]
pub struct BadHint(String);

/// Carried on the callback URL: the state and attempt a prompt was issued for.
/// Only ever compared against the server-side session, never trusted on its own.
///
/// Written as one `&`-free token, `<state>.<attempt>`, since the URL ends up
/// inside an XML attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnHint {
    pub state: Option<DialogState>,
    pub attempt: Option<u32>,
}

impl TurnHint {
    pub fn for_session(session: &CallSession) -> Self {
        Self {
            state: Some(session.state),
            attempt: Some(session.retry_count),
        }
    }

    /// A hint disagreeing with the session means the event answers an older prompt.
    pub fn is_stale_for(&self, session: &CallSession) -> bool {
        let state_differs = self.state.map_or(false, |s| s != session.state);
        let attempt_differs = self.attempt.map_or(false, |a| a != session.retry_count);
        state_differs || attempt_differs
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.attempt.is_none()
    }
}

impl fmt::Display for TurnHint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(state) = self.state {
            write!(f, "{state}")?;
        }
        if let Some(attempt) = self.attempt {
            write!(f, ".{attempt}")?;
        }
        Ok(())
    }
}

impl FromStr for TurnHint {
    type Err = BadHint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (state, attempt) = match s.split_once('.') {
            Some((state, attempt)) => (state, Some(attempt)),
            None => (s, None),
        };
        let state = match state {
            "" => None,
            name => Some(name.parse::<DialogState>()?),
        };
        let attempt = attempt
            .map(|a| a.parse::<u32>().map_err(|_| BadHint(s.to_string())))
            .transpose()?;
        Ok(Self { state, attempt })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Moved on to a new question (or re-issuing the current one unchanged)
    Asked,
    /// Same question again after unusable input
    Reasked(AppError),
    /// Amount captured; the session is now `Complete` and must be recorded
    Captured,
    /// Retry bound exceeded; nothing will be recorded
    Abandoned(AppError),
}

pub fn classify_role(input: &TurnInput) -> Option<Role> {
    match input.digits.as_deref() {
        Some("1") => return Some(Role::Seller),
        Some("2") => return Some(Role::Buyer),
        _ => {}
    }
    let speech = input.speech.as_deref()?.to_lowercase();
    if speech.contains("sell") {
        Some(Role::Seller)
    } else if speech.contains("buy") || speech.contains("purchase") {
        Some(Role::Buyer)
    } else {
        None
    }
}

/// Apply one caller turn to a session.
///
/// Terminal sessions yield `DuplicateEvent` and are left untouched. Unusable input
/// bumps `retry_count`; once it goes past `max_retries` the session is abandoned.
pub fn advance(
    session: &mut CallSession,
    input: &TurnInput,
    max_retries: u32,
) -> Result<Outcome, AppError> {
    let current = session.state;
    let next = match current {
        DialogState::Complete | DialogState::Abandoned => return Err(AppError::DuplicateEvent),
        DialogState::Start => Some(DialogState::AwaitRole),
        DialogState::AwaitRole => classify_role(input).map(|role| {
            session.role = Some(role);
            match role {
                Role::Seller => DialogState::AwaitSellerLocation,
                Role::Buyer => DialogState::AwaitBuyerLocation,
            }
        }),
        state @ (DialogState::AwaitSellerLocation | DialogState::AwaitBuyerLocation) => {
            input.speech.as_ref().map(|location| {
                session.location = Some(location.clone());
                if state == DialogState::AwaitSellerLocation {
                    DialogState::AwaitSellerPrice
                } else {
                    DialogState::AwaitBuyerBudget
                }
            })
        }
        DialogState::AwaitSellerPrice | DialogState::AwaitBuyerBudget => {
            match input.raw_amount().map(currency::normalize) {
                Some(Ok(amount)) => {
                    session.amount = Some(amount);
                    Some(DialogState::Complete)
                }
                Some(Err(e)) => {
                    debug!(call_id=%session.call_id, error=%e, "amount rejected");
                    None
                }
                None => None,
            }
        }
    };

    match next {
        Some(state) => {
            session.state = state;
            session.retry_count = 0;
            if state == DialogState::Complete {
                Ok(Outcome::Captured)
            } else {
                Ok(Outcome::Asked)
            }
        }
        None => {
            session.retry_count += 1;
            if session.retry_count > max_retries {
                session.state = DialogState::Abandoned;
                Ok(Outcome::Abandoned(AppError::RetryLimitExceeded))
            } else {
                Ok(Outcome::Reasked(AppError::InputUnclassifiable))
            }
        }
    }
}
