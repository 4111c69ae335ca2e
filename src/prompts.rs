//! What the caller hears next, decided purely from the session and the outcome
//! of the turn just taken.

use crate::dialog::{DialogState, Outcome, Role, TurnHint};
use crate::session::CallSession;

use rust_decimal::Decimal;

pub const GREETING: &str = "Hello! This is the AI Real Estate Lead Matching System.";
pub const RECORD_FAILED: &str =
    "Sorry, there was an error saving your information. Please try again later. Goodbye.";
pub const GAVE_UP: &str =
    "Sorry, I'm having trouble understanding you. Please call back later. Goodbye.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Speech,
    Dtmf,
    Both,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Prompt {
        text: String,
        input: InputMode,
        /// Single keypress questions end the gather on the first digit
        num_digits: Option<u16>,
        hint: TurnHint,
    },
    EndCall {
        message: String,
    },
    /// Duplicate delivery for a finished call; answer with nothing
    Ignored,
}

const ROLE_QUESTION: &str =
    "If you are looking to sell property, press 1. If you are looking to buy property, press 2.";

fn question(session: &CallSession) -> (String, InputMode) {
    let location = session.location.as_deref().unwrap_or_default();
    match session.state {
        DialogState::Start | DialogState::AwaitRole => (ROLE_QUESTION.to_string(), InputMode::Both),
        DialogState::AwaitSellerLocation => (
            "What is the city and state of the property?".to_string(),
            InputMode::Speech,
        ),
        DialogState::AwaitBuyerLocation => (
            "What is your preferred city and state?".to_string(),
            InputMode::Speech,
        ),
        DialogState::AwaitSellerPrice => (
            format!(
                "Location: {location}. What is the asking price? Please state the amount, \
                 or enter it on your keypad followed by the pound key."
            ),
            InputMode::Both,
        ),
        DialogState::AwaitBuyerBudget => (
            format!(
                "Preferred location: {location}. What is your approximate budget? Please state \
                 the amount, or enter it on your keypad followed by the pound key."
            ),
            InputMode::Both,
        ),
        DialogState::Complete | DialogState::Abandoned => (String::new(), InputMode::Speech),
    }
}

fn lead_in(state: DialogState) -> &'static str {
    match state {
        DialogState::Start | DialogState::AwaitRole => GREETING,
        DialogState::AwaitSellerLocation => "Okay, you're looking to sell.",
        DialogState::AwaitBuyerLocation => "Okay, you're looking to buy.",
        _ => "Got it.",
    }
}

fn apology(state: DialogState) -> &'static str {
    match state {
        DialogState::Start | DialogState::AwaitRole => {
            "Sorry, I couldn't understand if you want to sell or buy. Let's try again."
        }
        DialogState::AwaitSellerLocation => "Sorry, I didn't catch the location. Let's try again.",
        DialogState::AwaitBuyerLocation => {
            "Sorry, I didn't catch the preferred location. Let's try again."
        }
        DialogState::AwaitSellerPrice => "Sorry, I couldn't understand the asking price.",
        DialogState::AwaitBuyerBudget => "Sorry, I couldn't understand the budget.",
        _ => "Sorry.",
    }
}

fn confirmation(session: &CallSession) -> String {
    let location = session.location.as_deref().unwrap_or_default();
    let amount = session.amount.unwrap_or(Decimal::ZERO);
    match session.role {
        Some(Role::Buyer) => format!(
            "Thank you! We have recorded your interest in buying in {location} \
             with a budget of {amount} dollars. Goodbye."
        ),
        _ => format!(
            "Thank you! We have recorded your property for sale in {location} \
             with an asking price of {amount} dollars. Goodbye."
        ),
    }
}

/// Render the reply for `session` after `outcome`. `Captured` means the lead was
/// recorded; a failed recording is rendered with `record_failed` instead.
pub fn render(session: &CallSession, outcome: &Outcome) -> Reply {
    match outcome {
        Outcome::Captured => Reply::EndCall {
            message: confirmation(session),
        },
        Outcome::Abandoned(_) => end_call(GAVE_UP),
        Outcome::Asked | Outcome::Reasked(_) => {
            if session.state.is_terminal() {
                return Reply::Ignored;
            }
            let (q, input) = question(session);
            let prefix = match outcome {
                Outcome::Reasked(_) => apology(session.state),
                _ => lead_in(session.state),
            };
            let num_digits = match session.state {
                DialogState::Start | DialogState::AwaitRole => Some(1),
                _ => None,
            };
            Reply::Prompt {
                text: format!("{prefix} {q}"),
                input,
                num_digits,
                hint: TurnHint::for_session(session),
            }
        }
    }
}

fn end_call(message: &str) -> Reply {
    Reply::EndCall {
        message: message.to_string(),
    }
}

pub fn record_failed() -> Reply {
    end_call(RECORD_FAILED)
}
