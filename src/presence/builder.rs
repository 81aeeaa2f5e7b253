use crate::error::{Result, RpcError};
use crate::presence::types::RichPresence;
use std::time::{SystemTime, UNIX_EPOCH};

/// Chained construction of a [`RichPresence`]
///
/// ```
/// use richlink::PresenceBuilder;
///
/// let presence = PresenceBuilder::new()
///     .state("In a group")
///     .details("Ranked match")
///     .party("lobby-7", 2, 4)
///     .build();
/// assert_eq!(presence.party_size, Some(2));
/// ```
#[derive(Debug, Default)]
pub struct PresenceBuilder {
    presence: RichPresence,
}

impl PresenceBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing presence
    pub fn from_presence(presence: RichPresence) -> Self {
        Self { presence }
    }

    /// Set the state (the user's current party status)
    pub fn state<S: Into<String>>(mut self, state: S) -> Self {
        self.presence.state = Some(state.into());
        self
    }

    /// Set the details (what the player is currently doing)
    pub fn details<S: Into<String>>(mut self, details: S) -> Self {
        self.presence.details = Some(details.into());
        self
    }

    /// Set the start timestamp to now
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the system clock is before the UNIX epoch.
    pub fn start_timestamp_now(mut self) -> Result<Self> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RpcError::InvalidConfig(format!("system time before UNIX epoch: {}", e)))?;
        self.presence.start_timestamp = i64::try_from(now.as_secs()).ok();
        Ok(self)
    }

    /// Set the start timestamp, in epoch seconds
    pub fn start_timestamp(mut self, timestamp: i64) -> Self {
        self.presence.start_timestamp = Some(timestamp);
        self
    }

    /// Set the end timestamp, in epoch seconds
    pub fn end_timestamp(mut self, timestamp: i64) -> Self {
        self.presence.end_timestamp = Some(timestamp);
        self
    }

    /// Set the large image asset key
    pub fn large_image<S: Into<String>>(mut self, key: S) -> Self {
        self.presence.large_image_key = Some(key.into());
        self
    }

    /// Set the large image text
    pub fn large_text<S: Into<String>>(mut self, text: S) -> Self {
        self.presence.large_image_text = Some(text.into());
        self
    }

    /// Set the small image asset key
    pub fn small_image<S: Into<String>>(mut self, key: S) -> Self {
        self.presence.small_image_key = Some(key.into());
        self
    }

    /// Set the small image text
    pub fn small_text<S: Into<String>>(mut self, text: S) -> Self {
        self.presence.small_image_text = Some(text.into());
        self
    }

    /// Set party id, current size and maximum size together
    pub fn party<S: Into<String>>(mut self, id: S, size: u32, max: u32) -> Self {
        self.presence.party_id = Some(id.into());
        self.presence.party_size = Some(size);
        self.presence.party_max = Some(max);
        self
    }

    /// Set party size and maximum without an id
    pub fn party_size(mut self, size: u32, max: u32) -> Self {
        self.presence.party_size = Some(size);
        self.presence.party_max = Some(max);
        self
    }

    /// Set the secret for Ask to Join and invites
    pub fn join_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.presence.join_secret = Some(secret.into());
        self
    }

    /// Set the secret for spectating
    pub fn spectate_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.presence.spectate_secret = Some(secret.into());
        self
    }

    /// Set the match secret
    #[deprecated(note = "the peer no longer uses match secrets")]
    pub fn match_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.presence.match_secret = Some(secret.into());
        self
    }

    /// Mark the activity as an instanced game session
    #[deprecated(note = "the peer no longer uses the instance flag")]
    pub fn instance(mut self, instance: bool) -> Self {
        self.presence.instance = instance;
        self
    }

    /// Build the presence
    pub fn build(self) -> RichPresence {
        self.presence
    }
}
