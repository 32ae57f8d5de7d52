//! Voice menu markup (TwiML).
//!
//! The provider fetches `/voice/welcome/{n}` when the customer answers and
//! posts keypad input to `/voice/handle-input/{n}`. Both answer with a
//! `<Response>` document built here. Action and redirect URLs are relative;
//! the provider resolves them against the URL it fetched.

use serde::Serialize;

use voice_confirm_core::{MenuChoice, VoiceLanguage, VoiceSettings};

use super::TelephonyError;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Seconds the menu waits for a key press before replaying.
pub const GATHER_TIMEOUT_SECS: u32 = 10;

#[derive(Debug, Serialize)]
#[serde(rename = "Response")]
struct Document {
    #[serde(rename = "$value")]
    verbs: Vec<Verb>,
}

#[derive(Debug, Serialize)]
enum Verb {
    Say(Say),
    Gather(Gather),
    Redirect(Redirect),
    Dial(String),
    Hangup,
}

#[derive(Debug, Serialize)]
struct Say {
    #[serde(rename = "@language")]
    language: &'static str,
    #[serde(rename = "@voice", skip_serializing_if = "Option::is_none")]
    voice: Option<String>,
    #[serde(rename = "$text")]
    text: String,
}

#[derive(Debug, Serialize)]
struct Gather {
    #[serde(rename = "@input")]
    input: &'static str,
    #[serde(rename = "@numDigits")]
    num_digits: u32,
    #[serde(rename = "@timeout")]
    timeout: u32,
    #[serde(rename = "@action")]
    action: String,
    #[serde(rename = "@method")]
    method: &'static str,
    #[serde(rename = "$value")]
    prompts: Vec<Verb>,
}

#[derive(Debug, Serialize)]
struct Redirect {
    #[serde(rename = "@method")]
    method: &'static str,
    #[serde(rename = "$text")]
    url: String,
}

/// Spoken lines for one language.
struct Prompts {
    menu: fn(&str) -> String,
    confirmed: &'static str,
    cancelled: &'static str,
    support: &'static str,
    invalid: &'static str,
    unknown_order: &'static str,
}

fn urdu_menu(order_number: &str) -> String {
    format!(
        "آپ کا آرڈر نمبر {order_number} ہے۔ \
         براہ کرم اپنے آرڈر کی تصدیق کے لیے 1 دبائیں۔ \
         آرڈر منسوخ کرنے کے لیے 0 دبائیں۔ \
         سپورٹ ٹیم سے بات کرنے کے لیے 2 دبائیں۔"
    )
}

fn english_menu(order_number: &str) -> String {
    format!(
        "Your order number is {order_number}. \
         Please press 1 to confirm your order. \
         Press 0 to cancel your order. \
         Press 2 to speak with our support team."
    )
}

const URDU: Prompts = Prompts {
    menu: urdu_menu,
    confirmed: "آپ کے آرڈر کی تصدیق ہو گئی ہے۔ آپ کا شکریہ۔",
    cancelled: "آپ کا آرڈر منسوخ کر دیا گیا ہے۔",
    support: "آپ کو سپورٹ ٹیم سے جوڑا جا رہا ہے۔",
    invalid: "معذرت، یہ ایک غلط انپٹ ہے۔",
    unknown_order: "معذرت، ہمیں آپ کا آرڈر نہیں ملا۔",
};

const ENGLISH: Prompts = Prompts {
    menu: english_menu,
    confirmed: "Your order has been confirmed. Thank you.",
    cancelled: "Your order has been cancelled.",
    support: "Connecting you to our support team.",
    invalid: "Sorry, that is not a valid option.",
    unknown_order: "Sorry, we could not find your order.",
};

const fn prompts(language: VoiceLanguage) -> &'static Prompts {
    match language {
        VoiceLanguage::Urdu => &URDU,
        VoiceLanguage::English => &ENGLISH,
    }
}

fn welcome_path(order_number: &str) -> String {
    format!("/api/voice/welcome/{}", urlencoding::encode(order_number))
}

fn handle_input_path(order_number: &str) -> String {
    format!("/api/voice/handle-input/{}", urlencoding::encode(order_number))
}

fn render(verbs: Vec<Verb>) -> Result<String, TelephonyError> {
    let body = quick_xml::se::to_string(&Document { verbs })
        .map_err(|e| TelephonyError::Render(e.to_string()))?;
    Ok(format!("{XML_DECLARATION}{body}"))
}

/// Renders the confirmation menu and its replies.
#[derive(Debug, Clone)]
pub struct Ivr {
    support_number: String,
}

impl Ivr {
    #[must_use]
    pub fn new(support_number: impl Into<String>) -> Self {
        Self {
            support_number: support_number.into(),
        }
    }

    fn say(settings: &VoiceSettings, text: impl Into<String>) -> Verb {
        Verb::Say(Say {
            language: settings.language.locale(),
            voice: settings.voice().map(String::from),
            text: text.into(),
        })
    }

    /// The menu: prompt inside a one-digit gather, then replay on timeout.
    ///
    /// # Errors
    ///
    /// `Render` if serialization fails.
    pub fn render_menu(
        &self,
        order_number: &str,
        settings: &VoiceSettings,
    ) -> Result<String, TelephonyError> {
        let prompt = (prompts(settings.language).menu)(order_number);
        render(vec![
            Verb::Gather(Gather {
                input: "dtmf",
                num_digits: 1,
                timeout: GATHER_TIMEOUT_SECS,
                action: handle_input_path(order_number),
                method: "POST",
                prompts: vec![Self::say(settings, prompt)],
            }),
            Verb::Redirect(Redirect {
                method: "POST",
                url: welcome_path(order_number),
            }),
        ])
    }

    /// Reply to a key press.
    ///
    /// # Errors
    ///
    /// `Render` if serialization fails.
    pub fn render_reply(
        &self,
        order_number: &str,
        choice: MenuChoice,
        settings: &VoiceSettings,
    ) -> Result<String, TelephonyError> {
        let lines = prompts(settings.language);
        let verbs = match choice {
            MenuChoice::Confirm => vec![Self::say(settings, lines.confirmed), Verb::Hangup],
            MenuChoice::Cancel => vec![Self::say(settings, lines.cancelled), Verb::Hangup],
            MenuChoice::Support => vec![
                Self::say(settings, lines.support),
                Verb::Dial(self.support_number.clone()),
            ],
            MenuChoice::Invalid => vec![
                Self::say(settings, lines.invalid),
                Verb::Redirect(Redirect {
                    method: "POST",
                    url: welcome_path(order_number),
                }),
            ],
        };
        render(verbs)
    }

    /// Apology and hangup for an order number we do not know.
    ///
    /// # Errors
    ///
    /// `Render` if serialization fails.
    pub fn render_unknown_order(&self, settings: &VoiceSettings) -> Result<String, TelephonyError> {
        render(vec![
            Self::say(settings, prompts(settings.language).unknown_order),
            Verb::Hangup,
        ])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ivr() -> Ivr {
        Ivr::new("+923001112222")
    }

    fn english() -> VoiceSettings {
        VoiceSettings {
            language: VoiceLanguage::English,
            voice_id: "Polly.Joanna".to_string(),
            ..VoiceSettings::default()
        }
    }

    #[test]
    fn test_menu_gathers_one_digit() {
        let xml = ivr().render_menu("1001", &VoiceSettings::default()).unwrap();

        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains("<Response>"));
        assert!(xml.contains(r#"numDigits="1""#));
        assert!(xml.contains(r#"timeout="10""#));
        assert!(xml.contains(r#"action="/api/voice/handle-input/1001""#));
        assert!(xml.contains(r#"<Say language="ur-PK">"#));
        assert!(xml.contains("آپ کا آرڈر نمبر 1001 ہے۔"));
        assert!(xml.contains("/api/voice/welcome/1001</Redirect>"));

        // The prompt is spoken inside the gather so a key press interrupts it
        let gather = xml.find("<Gather").unwrap();
        let say = xml.find("<Say").unwrap();
        let gather_end = xml.find("</Gather>").unwrap();
        assert!(gather < say && say < gather_end);
        assert!(gather_end < xml.find("<Redirect").unwrap());
    }

    #[test]
    fn test_menu_language_and_voice() {
        let xml = ivr().render_menu("1001", &english()).unwrap();
        assert!(xml.contains(r#"language="en-US""#));
        assert!(xml.contains(r#"voice="Polly.Joanna""#));
        assert!(xml.contains("Your order number is 1001."));
    }

    #[test]
    fn test_default_voice_is_omitted() {
        let xml = ivr().render_menu("1001", &VoiceSettings::default()).unwrap();
        assert!(!xml.contains("voice="));
    }

    #[test]
    fn test_replies() {
        let settings = VoiceSettings::default();

        let confirmed = ivr()
            .render_reply("1001", MenuChoice::Confirm, &settings)
            .unwrap();
        assert!(confirmed.contains("آپ کے آرڈر کی تصدیق ہو گئی ہے۔"));
        assert!(confirmed.contains("Hangup"));

        let cancelled = ivr()
            .render_reply("1001", MenuChoice::Cancel, &settings)
            .unwrap();
        assert!(cancelled.contains("آپ کا آرڈر منسوخ کر دیا گیا ہے۔"));

        let support = ivr()
            .render_reply("1001", MenuChoice::Support, &settings)
            .unwrap();
        assert!(support.contains("<Dial>+923001112222</Dial>"));

        let invalid = ivr()
            .render_reply("1001", MenuChoice::Invalid, &settings)
            .unwrap();
        assert!(invalid.contains("معذرت، یہ ایک غلط انپٹ ہے۔"));
        assert!(invalid.contains("/api/voice/welcome/1001</Redirect>"));
        assert!(!invalid.contains("Hangup"));
    }

    #[test]
    fn test_order_number_is_escaped_in_urls() {
        let xml = ivr()
            .render_menu("A&B 7", &VoiceSettings::default())
            .unwrap();
        assert!(xml.contains("/api/voice/handle-input/A%26B%207"));
    }

    #[test]
    fn test_unknown_order() {
        let xml = ivr().render_unknown_order(&english()).unwrap();
        assert!(xml.contains("could not find your order"));
        assert!(xml.contains("Hangup"));
    }
}
