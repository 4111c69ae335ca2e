use crate::consts::TURN_PATH;
use crate::dialog::TurnHint;
use crate::prompts::{InputMode, Reply};
use crate::twilio_types::{
    wrap_twiml, GatherAction, GatherInput, GatherPrompt, HangupAction, HttpMethod,
    RedirectAction, Response, ResponseAction, SayAction,
};

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use tracing::trace;

/// Where the caller's answer to a prompt should be posted. The hint is a single
/// query parameter so the URL stays free of `&` inside the Gather attribute.
pub fn turn_action(hint: &TurnHint) -> String {
    if hint.is_empty() {
        TURN_PATH.to_string()
    } else {
        format!("{TURN_PATH}?hint={hint}")
    }
}

fn say(text: String) -> SayAction {
    SayAction {
        text,
        ..Default::default()
    }
}

/// A prompt becomes a Gather followed by a Redirect to the same action, so
/// silence still produces a (blank) turn instead of ending the call.
pub fn reply_to_twiml(reply: &Reply) -> String {
    let actions = match reply {
        Reply::Prompt {
            text,
            input,
            num_digits,
            hint,
        } => {
            let action = turn_action(hint);
            let input = match input {
                InputMode::Speech => GatherInput::Speech,
                InputMode::Dtmf => GatherInput::Dtmf,
                InputMode::Both => GatherInput::Both,
            };
            vec![
                ResponseAction::Gather(GatherAction {
                    input: Some(input),
                    action: action.clone(),
                    method: Some(HttpMethod::Post),
                    speech_timeout: Some("auto".to_string()),
                    num_digits: *num_digits,
                    prompt: GatherPrompt::Say(say(text.clone())),
                }),
                ResponseAction::Redirect(RedirectAction {
                    url: action,
                    method: Some(HttpMethod::Post),
                }),
            ]
        }
        Reply::EndCall { message } => vec![
            ResponseAction::Say(say(message.clone())),
            ResponseAction::Hangup(HangupAction {}),
        ],
        Reply::Ignored => vec![],
    };

    let twiml = wrap_twiml(xmlserde::xml_serialize(Response { actions }));
    trace!("twiml: '{}'", twiml);
    twiml
}

pub fn twiml_response(twiml: String) -> (StatusCode, HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    (StatusCode::OK, headers, twiml)
}
