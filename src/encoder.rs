//! Turns presence records and commands into outgoing frames
//!
//! Everything here is pure: no pipe access, no clock.

use serde_json::{json, Value};

use crate::error::{Result, RpcError};
use crate::ipc::{Command, EventName, Frame, HandshakePayload, IpcMessage, Opcode};
use crate::presence::{
    Activity, ActivityAssets, ActivityParty, ActivitySecrets, ActivityTimestamps, RichPresence,
};

/// Byte limits for presence string fields
pub mod limits {
    /// state, details, party id, tooltips and secrets
    pub const TEXT: usize = 128;
    /// Asset keys
    pub const IMAGE_KEY: usize = 32;
}

/// What to do with a string field longer than its byte limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OversizePolicy {
    /// Fail the update with [`RpcError::Encoding`]
    #[default]
    Reject,
    /// Cut the string at the last UTF-8 boundary within the limit
    Truncate,
}

/// Reply to an incoming join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinReply {
    Yes,
    No,
    Ignore,
}

/// Longest prefix of `s` that is at most `limit` bytes and valid UTF-8
pub fn truncate_str(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Presence encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceEncoder {
    policy: OversizePolicy,
}

impl PresenceEncoder {
    pub fn new(policy: OversizePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OversizePolicy {
        self.policy
    }

    fn field(
        &self,
        name: &'static str,
        value: &Option<String>,
        limit: usize,
    ) -> Result<Option<String>> {
        let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(None);
        };

        if value.len() <= limit {
            return Ok(Some(value.to_string()));
        }

        match self.policy {
            OversizePolicy::Reject => Err(RpcError::Encoding {
                field: name,
                limit,
                actual: value.len(),
            }),
            OversizePolicy::Truncate => {
                log::debug!("Truncating `{}` from {} to {} bytes", name, value.len(), limit);
                Ok(Some(truncate_str(value, limit).to_string()))
            }
        }
    }

    /// Validate `presence` and convert it into its wire form
    ///
    /// Empty groups (no timestamps, no assets, ...) are omitted entirely.
    /// Party size and max are sent whenever both are set and max is
    /// non-zero, with or without a party id. A one-sided or zero-max size is
    /// left out.
    pub fn encode(&self, presence: &RichPresence) -> Result<Activity> {
        let state = self.field("state", &presence.state, limits::TEXT)?;
        let details = self.field("details", &presence.details, limits::TEXT)?;

        let timestamps = ActivityTimestamps {
            start: presence.start_timestamp.filter(|t| *t != 0),
            end: presence.end_timestamp.filter(|t| *t != 0),
        };

        let assets = ActivityAssets {
            large_image: self.field(
                "large_image_key",
                &presence.large_image_key,
                limits::IMAGE_KEY,
            )?,
            large_text: self.field("large_image_text", &presence.large_image_text, limits::TEXT)?,
            small_image: self.field(
                "small_image_key",
                &presence.small_image_key,
                limits::IMAGE_KEY,
            )?,
            small_text: self.field("small_image_text", &presence.small_image_text, limits::TEXT)?,
        };

        let party = ActivityParty {
            id: self.field("party_id", &presence.party_id, limits::TEXT)?,
            size: match (presence.party_size, presence.party_max) {
                (Some(size), Some(max)) if max > 0 => Some([size, max]),
                _ => None,
            },
        };

        let secrets = ActivitySecrets {
            join: self.field("join_secret", &presence.join_secret, limits::TEXT)?,
            spectate: self.field("spectate_secret", &presence.spectate_secret, limits::TEXT)?,
            match_secret: self.field("match_secret", &presence.match_secret, limits::TEXT)?,
        };

        Ok(Activity {
            state,
            details,
            timestamps: Some(timestamps).filter(|t| *t != ActivityTimestamps::default()),
            assets: Some(assets).filter(|a| *a != ActivityAssets::default()),
            party: Some(party).filter(|p| *p != ActivityParty::default()),
            secrets: Some(secrets).filter(|s| *s != ActivitySecrets::default()),
            instance: presence.instance,
        })
    }
}

fn command_frame(cmd: Command, evt: Option<EventName>, args: Value, nonce: String) -> Result<Frame> {
    let message = IpcMessage {
        cmd,
        args,
        evt,
        nonce,
    };
    Ok(Frame::new(Opcode::Frame, serde_json::to_value(message)?))
}

/// The opening frame of every connection
pub fn handshake_frame(version: u32, client_id: &str) -> Result<Frame> {
    let payload = HandshakePayload {
        v: version,
        client_id: client_id.to_string(),
    };
    Ok(Frame::new(Opcode::Handshake, serde_json::to_value(payload)?))
}

/// `SET_ACTIVITY`; `None` clears the presence
pub fn set_activity_frame(activity: Option<&Activity>, pid: u32, nonce: String) -> Result<Frame> {
    let args = json!({
        "pid": pid,
        "activity": activity,
    });
    command_frame(Command::SetActivity, None, args, nonce)
}

/// `SUBSCRIBE` to one dispatch event
pub fn subscribe_frame(event: EventName, nonce: String) -> Result<Frame> {
    command_frame(Command::Subscribe, Some(event), json!({}), nonce)
}

/// Answer to an `ACTIVITY_JOIN_REQUEST`, or `None` for [`JoinReply::Ignore`]
pub fn join_reply_frame(user_id: &str, reply: JoinReply, nonce: String) -> Result<Option<Frame>> {
    let cmd = match reply {
        JoinReply::Yes => Command::SendActivityJoinInvite,
        JoinReply::No => Command::CloseActivityRequest,
        JoinReply::Ignore => return Ok(None),
    };
    command_frame(cmd, None, json!({ "user_id": user_id }), nonce).map(Some)
}
