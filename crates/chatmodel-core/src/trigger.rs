//! Decides whether an inbound message is routed to the model at all.
//!
//! Structural checks run first; the random draw only happens for messages that
//! would otherwise be accepted.

use rand::Rng;

use crate::{config::TriggerSettings, domain::InboundMessage};

#[derive(Clone, Debug, PartialEq)]
pub enum TriggerDecision {
    /// Accepted, with the prompt text (prefix stripped, trimmed).
    Accept(String),
    Reject(RejectReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    SelfOriginated,
    PrivateDisabled,
    GroupDisabled,
    MissingPrefix,
    Empty,
    NotSampled,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::SelfOriginated => "self-originated",
            RejectReason::PrivateDisabled => "private messages disabled",
            RejectReason::GroupDisabled => "group messages disabled",
            RejectReason::MissingPrefix => "missing trigger prefix",
            RejectReason::Empty => "empty content",
            RejectReason::NotSampled => "not sampled",
        }
    }
}

/// Run the gate with a uniform `[0, 100)` draw from the thread RNG.
pub fn should_trigger(msg: &InboundMessage, settings: &TriggerSettings) -> TriggerDecision {
    evaluate(msg, settings, || rand::thread_rng().gen_range(0.0..100.0))
}

/// Run the gate with a caller-supplied sample source (called at most once).
pub fn evaluate(
    msg: &InboundMessage,
    settings: &TriggerSettings,
    sample: impl FnOnce() -> f64,
) -> TriggerDecision {
    let decision = decide(msg, settings, sample);
    if let TriggerDecision::Reject(reason) = &decision {
        tracing::debug!(
            user = %msg.user_id,
            channel = %msg.channel_id,
            reason = reason.as_str(),
            "message not routed to model"
        );
    }
    decision
}

fn decide(
    msg: &InboundMessage,
    settings: &TriggerSettings,
    sample: impl FnOnce() -> f64,
) -> TriggerDecision {
    use RejectReason::*;

    if msg.is_self_originated() {
        return TriggerDecision::Reject(SelfOriginated);
    }

    if msg.is_private() {
        if !settings.private {
            return TriggerDecision::Reject(PrivateDisabled);
        }
    } else if !settings.group {
        return TriggerDecision::Reject(GroupDisabled);
    }

    let content = match settings.prefix.as_deref().filter(|p| !p.is_empty()) {
        Some(prefix) => match msg.content.strip_prefix(prefix) {
            Some(rest) => rest.trim(),
            None => return TriggerDecision::Reject(MissingPrefix),
        },
        None => msg.content.trim(),
    };

    if content.is_empty() {
        return TriggerDecision::Reject(Empty);
    }

    // Accept iff the draw falls below the ratio: 0 never fires, 100 always does.
    if settings.ratio < 100.0 && sample() >= settings.ratio {
        return TriggerDecision::Reject(NotSampled);
    }

    TriggerDecision::Accept(content.to_string())
}
