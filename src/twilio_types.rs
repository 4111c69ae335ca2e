pub fn wrap_twiml(twiml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{twiml}")
}

mod twiml {
    use xmlserde::xml_serde_enum;
    use xmlserde_derives::XmlSerialize;

    #[derive(PartialEq, Eq, XmlSerialize)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Gather")]
        Gather(GatherAction),
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Redirect")]
        Redirect(RedirectAction),
        #[xmlserde(name = b"Hangup")]
        Hangup(HangupAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct SayAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"loop", ty = "attr")]
        pub lp: Option<u16>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    /// Collects speech and/or keypresses, then POSTs them to `action`.
    #[derive(PartialEq, Eq, XmlSerialize)]
    pub struct GatherAction {
        #[xmlserde(name = b"input", ty = "attr")]
        pub input: Option<GatherInput>,
        #[xmlserde(name = b"action", ty = "attr")]
        pub action: String,
        #[xmlserde(name = b"method", ty = "attr")]
        pub method: Option<HttpMethod>,
        #[xmlserde(name = b"speechTimeout", ty = "attr")]
        pub speech_timeout: Option<String>,
        #[xmlserde(name = b"numDigits", ty = "attr")]
        pub num_digits: Option<u16>,
        #[xmlserde(ty = "untag")]
        pub prompt: GatherPrompt,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum GatherPrompt {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct RedirectAction {
        #[xmlserde(ty = "text")]
        pub url: String,
        #[xmlserde(name = b"method", ty = "attr")]
        pub method: Option<HttpMethod>,
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct HangupAction {}

    xml_serde_enum! {
        #[derive(PartialEq, Eq, Debug)]
        GatherInput {
            Speech => "speech",
            Dtmf => "dtmf",
            Both => "speech dtmf",
        }
    }

    xml_serde_enum! {
        #[derive(PartialEq, Eq, Debug)]
        HttpMethod {
            Get => "GET",
            Post => "POST",
        }
    }
}
pub use twiml::*;

mod voice {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq, Eq)]
    #[serde(rename_all = "kebab-case")]
    pub enum CallStatus {
        Queued,
        Ringing,
        InProgress,
        Completed,
        Busy,
        Failed,
        NoAnswer,
        Canceled,
        #[serde(other)]
        Unknown,
    }

    /// Form body of Twilio's voice webhooks: the initial request and every
    /// Gather action callback.
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "PascalCase")]
    pub struct TwilioVoicePayload {
        pub call_sid: String,
        pub from: Option<String>,
        pub call_status: Option<CallStatus>,
        pub digits: Option<String>,
        pub speech_result: Option<String>,
        pub confidence: Option<f32>,
    }

    /// The parts of Twilio's Call resource we read back after placing a call.
    #[derive(Deserialize, Debug)]
    pub struct CallResource {
        pub sid: String,
        pub status: Option<CallStatus>,
    }
}
pub use voice::*;
