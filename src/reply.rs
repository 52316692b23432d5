//! Auto-reply generation for food questions.

use crate::openai::{ChatRequest, Completion, Error};

pub const MODEL: &str = "gpt-4";

pub const MAX_TOKENS: u32 = 150;

pub const SYSTEM_PROMPT: &str = "You are a cheerful auto-responder in Marcus's family WhatsApp chat. \
Say yes to food questions unless otherwise instructed. Keep responses short and family-friendly.";

/// Generate a reply to `original_text`, passed through verbatim.
pub async fn generate(completion: &dyn Completion, original_text: &str) -> Result<String, Error> {
    completion
        .chat(ChatRequest {
            model: MODEL,
            system_prompt: SYSTEM_PROMPT,
            user_text: original_text,
            max_tokens: MAX_TOKENS,
        })
        .await
}
