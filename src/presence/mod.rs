//! The presence record and its wire form

mod builder;
mod types;

pub use builder::PresenceBuilder;
pub use types::{
    Activity, ActivityAssets, ActivityParty, ActivitySecrets, ActivityTimestamps, RichPresence,
};
