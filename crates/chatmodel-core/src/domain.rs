use std::fmt;

/// Host-side user identity (opaque).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

/// Host-side channel identity (opaque). A private channel shares its id with
/// the user on the other end.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat message that no earlier middleware has answered yet.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    /// Identity of the bot account that received the message.
    pub bot_id: UserId,
    pub content: String,
}

impl InboundMessage {
    pub fn is_private(&self) -> bool {
        self.channel_id.0 == self.user_id.0
    }

    pub fn is_self_originated(&self) -> bool {
        self.user_id == self.bot_id
    }
}
