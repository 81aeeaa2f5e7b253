use serde::{Deserialize, Serialize};

/// What the user is currently doing, as shown by the peer
///
/// This is a plain value: editing fields has no side effect. Hand it to
/// [`RpcClient::update_presence`](crate::RpcClient::update_presence) to
/// transmit it. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichPresence {
    /// The user's current party status (max 128 bytes)
    pub state: Option<String>,
    /// What the player is currently doing (max 128 bytes)
    pub details: Option<String>,
    /// Epoch seconds; shows time as "elapsed"
    pub start_timestamp: Option<i64>,
    /// Epoch seconds; shows time as "remaining"
    pub end_timestamp: Option<i64>,
    /// Uploaded asset name for the large artwork (max 32 bytes)
    pub large_image_key: Option<String>,
    /// Tooltip for the large artwork (max 128 bytes)
    pub large_image_text: Option<String>,
    /// Uploaded asset name for the small artwork (max 32 bytes)
    pub small_image_key: Option<String>,
    /// Tooltip for the small artwork (max 128 bytes)
    pub small_image_text: Option<String>,
    /// Party, lobby or group id (max 128 bytes)
    pub party_id: Option<String>,
    /// Current party size; only sent together with a non-zero `party_max`
    pub party_size: Option<u32>,
    /// Party capacity; when unset or zero, no size is sent at all
    pub party_max: Option<u32>,
    /// Deprecated "notify me" secret, still sent when set
    pub match_secret: Option<String>,
    /// Secret for chat invitations and Ask to Join (max 128 bytes)
    pub join_secret: Option<String>,
    /// Secret for the Spectate button (max 128 bytes)
    pub spectate_secret: Option<String>,
    /// Deprecated, still sent when set
    pub instance: bool,
}

impl RichPresence {
    pub fn builder() -> super::PresenceBuilder {
        super::PresenceBuilder::new()
    }
}

/// Wire form of a presence, the `activity` argument of `SET_ACTIVITY`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<ActivityTimestamps>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<ActivityAssets>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<ActivityParty>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<ActivitySecrets>,

    #[serde(default)]
    pub instance: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAssets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityParty {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>, // [current, max]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySecrets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectate: Option<String>,

    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_secret: Option<String>,
}
