//! Permission flags carried in the session descriptor
//!
//! The hub sends the full set once per session and afterwards only typed
//! [`PermissionChange`] messages. Changes are applied through an explicit
//! `match` over a closed set of permissions.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Global permissions the local user grants to paired clients
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PermissionSet: u32 {
        /// Paired clients may apply the synchronized appearance
        const APPEARANCE_SYNC   = 1 << 0;
        /// Paired clients may lock and change wardrobe items
        const WARDROBE_SYNC     = 1 << 1;
        /// Paired clients may issue remote commands
        const REMOTE_COMMANDS   = 1 << 2;
        /// Paired clients may trigger puppeteer phrases
        const PUPPETEER         = 1 << 3;
        /// Paired clients may drive connected toys
        const TOYBOX            = 1 << 4;
        /// Outgoing chat is garbled while a gag is active
        const CHAT_GARBLER      = 1 << 5;
        /// Online presence is visible to paired clients
        const PRESENCE_VISIBLE  = 1 << 6;

        /// Permissions granted to a freshly registered account
        const DEFAULT = Self::APPEARANCE_SYNC.bits()
            | Self::WARDROBE_SYNC.bits()
            | Self::PRESENCE_VISIBLE.bits();
    }
}

/// A single permission, addressable by typed messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    AppearanceSync,
    WardrobeSync,
    RemoteCommands,
    Puppeteer,
    Toybox,
    ChatGarbler,
    PresenceVisible,
}

impl Permission {
    /// All permissions, in flag order
    pub const ALL: [Self; 7] = [
        Self::AppearanceSync,
        Self::WardrobeSync,
        Self::RemoteCommands,
        Self::Puppeteer,
        Self::Toybox,
        Self::ChatGarbler,
        Self::PresenceVisible,
    ];

    /// Get the flag backing this permission
    #[must_use]
    pub const fn flag(self) -> PermissionSet {
        match self {
            Self::AppearanceSync => PermissionSet::APPEARANCE_SYNC,
            Self::WardrobeSync => PermissionSet::WARDROBE_SYNC,
            Self::RemoteCommands => PermissionSet::REMOTE_COMMANDS,
            Self::Puppeteer => PermissionSet::PUPPETEER,
            Self::Toybox => PermissionSet::TOYBOX,
            Self::ChatGarbler => PermissionSet::CHAT_GARBLER,
            Self::PresenceVisible => PermissionSet::PRESENCE_VISIBLE,
        }
    }

    /// Get the name of this permission
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AppearanceSync => "APPEARANCE_SYNC",
            Self::WardrobeSync => "WARDROBE_SYNC",
            Self::RemoteCommands => "REMOTE_COMMANDS",
            Self::Puppeteer => "PUPPETEER",
            Self::Toybox => "TOYBOX",
            Self::ChatGarbler => "CHAT_GARBLER",
            Self::PresenceVisible => "PRESENCE_VISIBLE",
        }
    }
}

/// A permission update pushed by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionChange {
    /// Enable or disable one permission
    Set { permission: Permission, enabled: bool },
    /// Replace the whole set
    Replace(PermissionSet),
}

impl PermissionSet {
    /// Check a single permission
    #[inline]
    pub fn allows(&self, permission: Permission) -> bool {
        self.contains(permission.flag())
    }

    /// Apply a change, returning whether the set was modified
    pub fn apply(&mut self, change: PermissionChange) -> bool {
        let before = *self;
        match change {
            PermissionChange::Set {
                permission,
                enabled,
            } => self.set(permission.flag(), enabled),
            PermissionChange::Replace(set) => *self = set,
        }
        before != *self
    }

    /// Get the names of all enabled permissions
    pub fn list(&self) -> Vec<&'static str> {
        Permission::ALL
            .iter()
            .filter(|p| self.allows(**p))
            .map(|p| p.name())
            .collect()
    }
}

impl Serialize for PermissionSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.list().join(", "))
    }
}
