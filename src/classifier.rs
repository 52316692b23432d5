//! Decides what to do with an inbound message.

use std::sync::LazyLock;

use regex::Regex;

use crate::message::InboundMessage;

/// Substring that marks a group as a family group.
const FAMILY_TOKEN: &str = "family";

/// Dinner-like questions in English and Swedish. No word boundaries.
static FOOD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(sushi|pizza|dinner|takeout|eat|hungry|food|restaurant|order|mat|middag|lunch|äta|hungrig|käk|maten|restaurang|beställa|när.*?mat|vad.*?äta)",
    )
    .expect("food pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Ignore,
    /// Generate a reply to this text.
    AutoReply(String),
    ArmStandby,
    /// The operator spoke, cancel any standby.
    DisarmStandby,
}

pub fn is_family_group(name: &str) -> bool {
    name.to_lowercase().contains(FAMILY_TOKEN)
}

pub fn is_food_question(text: &str) -> bool {
    FOOD_PATTERN.is_match(text)
}

/// Whether `classify` needs the group name for this message. Lets the caller
/// skip the metadata lookup for messages that are ignored anyway.
pub fn needs_group_name(msg: &InboundMessage) -> bool {
    msg.is_group && (msg.from_self || !msg.text().is_empty())
}

/// Classify a message. `group_name` is `None` when the lookup failed or was
/// skipped. Pure: same inputs, same decision.
pub fn classify(msg: &InboundMessage, group_name: Option<&str>) -> Decision {
    let family = group_name.is_some_and(is_family_group);

    if msg.from_self {
        return if msg.is_group && family {
            Decision::DisarmStandby
        } else {
            Decision::Ignore
        };
    }

    if !msg.is_group {
        return Decision::Ignore;
    }

    let text = msg.text();
    if text.is_empty() || !family {
        return Decision::Ignore;
    }

    if is_food_question(text) {
        Decision::AutoReply(text.to_string())
    } else {
        Decision::ArmStandby
    }
}
