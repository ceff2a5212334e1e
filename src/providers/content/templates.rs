//! Built-in template generator.
//!
//! Always available and fully deterministic for a given seed, so warmup
//! traffic keeps flowing when no completion endpoint is configured or the
//! configured one is down.

use async_trait::async_trait;

use super::traits::{
    reply_subject, ContentGenerator, ContentKind, ContentRequest, ContentResult, GeneratedMessage,
};

const OPENER_SUBJECTS: &[&str] = &[
    "coffee sometime this week?",
    "that article you mentioned",
    "quick question about your setup",
    "catching up",
    "saw this and thought of you",
    "how's the quarter going?",
    "lunch near the office?",
    "long overdue hello",
];

const OPENER_BODIES: &[&str] = &[
    "Hey {recipient},\n\nBeen a while! Any chance you're free for coffee this week? Would love to hear how things are going on your side.\n\n{sender}",
    "Hi {recipient},\n\nFinally got around to reading that piece you mentioned last time. You were right, the second half is the good part. Worth a chat next time we talk.\n\n{sender}",
    "{recipient},\n\nQuick one: what are you using for your staging environment these days? Ours is creaking and I remember you'd sorted this out.\n\n{sender}",
    "Hey {recipient},\n\nRealized it's been months since we caught up. How's the team? Things here are busy but good. Let's not leave it another quarter.\n\n{sender}",
    "Hi {recipient},\n\nCame across a write-up today that's exactly the problem you were describing at dinner. Sending it over when I find the link again. How have you been?\n\n{sender}",
    "{recipient},\n\nHow did the launch land in the end? Was thinking about it the other day. Hope the on-call week after wasn't too brutal.\n\n{sender}",
    "Hey {recipient},\n\nI'm around your end of town Thursday. Lunch? There's a decent noodle place I keep meaning to try.\n\n{sender}",
    "Hi {recipient},\n\nNo agenda here, just realized I owe you a hello. Hope the new role is treating you well. Drop me a line when you surface.\n\n{sender}",
];

const ACKNOWLEDGMENT_REPLIES: &[&str] = &[
    "Got it, thanks for the heads up.\n\n{sender}",
    "Makes sense. Noted for next time.\n\n{sender}",
    "Sounds good on my end.\n\n{sender}",
];

const QUESTION_REPLIES: &[&str] = &[
    "Interesting. How long did that take to set up?\n\n{sender}",
    "Wait, which one do you mean? There were two if I remember right.\n\n{sender}",
    "Is that still the case after the move? Curious how it shook out.\n\n{sender}",
];

const APPRECIATION_REPLIES: &[&str] = &[
    "This is great, thanks for thinking of me.\n\n{sender}",
    "Appreciate you sending this over. Exactly what I needed.\n\n{sender}",
    "Ha, perfect timing. Thanks!\n\n{sender}",
];

const SCHEDULING_REPLIES: &[&str] = &[
    "Thursday works for me. Say noon?\n\n{sender}",
    "This week is packed but early next week is wide open. Monday?\n\n{sender}",
    "Yes! Let me check my calendar and send a couple of slots.\n\n{sender}",
];

const FOLLOW_UP_REPLIES: &[&str] = &[
    "Good timing, I was about to ping you about the same thing. Let me dig up the details and get back to you.\n\n{sender}",
    "Still meaning to reply properly to your last note. Short version: yes, and let's talk soon.\n\n{sender}",
    "Adding this to my list for the weekend. Will report back.\n\n{sender}",
];

const SIGN_OFF_REPLIES: &[&str] = &[
    "Likewise! Talk soon.\n\n{sender}",
    "Same here. Catch you later.\n\n{sender}",
    "Cheers!\n\n{sender}",
];

const REPLY_REGISTERS: &[&[&str]] = &[
    ACKNOWLEDGMENT_REPLIES,
    QUESTION_REPLIES,
    APPRECIATION_REPLIES,
    SCHEDULING_REPLIES,
    FOLLOW_UP_REPLIES,
    SIGN_OFF_REPLIES,
];

/// Deterministic [`ContentGenerator`] drawing from a fixed template bank.
#[derive(Debug, Default)]
pub struct TemplateBank;

impl TemplateBank {
    pub fn new() -> Self {
        Self
    }

    fn fill(template: &str, request: &ContentRequest) -> String {
        template
            .replace("{sender}", &request.sender_name)
            .replace("{recipient}", &request.recipient_name)
    }
}

#[async_trait]
impl ContentGenerator for TemplateBank {
    fn name(&self) -> &str {
        "templates"
    }

    async fn generate(&self, request: &ContentRequest) -> ContentResult<GeneratedMessage> {
        let seed = request.seed as usize;

        let message = match &request.kind {
            ContentKind::Opener => {
                let subject = OPENER_SUBJECTS[seed % OPENER_SUBJECTS.len()];
                let body = OPENER_BODIES[seed % OPENER_BODIES.len()];
                GeneratedMessage {
                    subject: subject.to_string(),
                    body: Self::fill(body, request),
                }
            }
            ContentKind::Reply {
                original_subject, ..
            } => {
                let register = REPLY_REGISTERS[seed % REPLY_REGISTERS.len()];
                let body = register[(seed / REPLY_REGISTERS.len()) % register.len()];
                GeneratedMessage {
                    subject: reply_subject(original_subject),
                    body: Self::fill(body, request),
                }
            }
        };

        Ok(message)
    }
}
