//! Bluetooth profile UUIDs and the table of well-known ones.

use crate::errors::BluezError;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const A2DP_SOURCE_UUID: &str = "0000110a-0000-1000-8000-00805f9b34fb";
pub const A2DP_SINK_UUID: &str = "0000110b-0000-1000-8000-00805f9b34fb";
pub const HFP_HS_UUID: &str = "0000111e-0000-1000-8000-00805f9b34fb";
pub const HFP_AG_UUID: &str = "0000111f-0000-1000-8000-00805f9b34fb";
pub const HID_UUID: &str = "00001124-0000-1000-8000-00805f9b34fb";
pub const HOGP_UUID: &str = "00001812-0000-1000-8000-00805f9b34fb";

/// Well-known profiles: command line alias, uuid, human-readable name.
pub const WELL_KNOWN_PROFILES: &[(&str, &str, &str)] = &[
    ("a2dp-source", A2DP_SOURCE_UUID, "Audio Source"),
    ("a2dp-sink", A2DP_SINK_UUID, "Audio Sink"),
    ("hfp-hs", HFP_HS_UUID, "Handsfree"),
    ("hfp-ag", HFP_AG_UUID, "Handsfree Audio Gateway"),
    ("hid", HID_UUID, "Human Interface Device"),
    ("hogp", HOGP_UUID, "HID over GATT"),
];

/// A 128-bit service/profile identifier, compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProfileUuid(Uuid);

impl ProfileUuid {
    pub fn a2dp_source() -> Self {
        Self::well_known(A2DP_SOURCE_UUID)
    }

    pub fn a2dp_sink() -> Self {
        Self::well_known(A2DP_SINK_UUID)
    }

    pub fn hfp_hs() -> Self {
        Self::well_known(HFP_HS_UUID)
    }

    pub fn hfp_ag() -> Self {
        Self::well_known(HFP_AG_UUID)
    }

    pub fn hid() -> Self {
        Self::well_known(HID_UUID)
    }

    pub fn hogp() -> Self {
        Self::well_known(HOGP_UUID)
    }

    fn well_known(text: &str) -> Self {
        // table constants are valid uuids
        Self(Uuid::parse_str(text).unwrap_or_default())
    }

    /// Resolves a table alias (`a2dp-sink`) or a literal uuid.
    pub fn from_alias(alias: &str) -> Result<Self, BluezError> {
        WELL_KNOWN_PROFILES
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(alias))
            .map(|(_, uuid, _)| Self::well_known(uuid))
            .map_or_else(|| alias.parse(), Ok)
    }

    /// Human-readable name when the uuid is in the well-known table.
    pub fn name(&self) -> Option<&'static str> {
        WELL_KNOWN_PROFILES
            .iter()
            .find(|(_, uuid, _)| Self::well_known(uuid) == *self)
            .map(|(_, _, name)| *name)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for ProfileUuid {
    type Err = BluezError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| BluezError::InvalidProfileUuid(s.to_string()))
    }
}

impl fmt::Display for ProfileUuid {
    /// Lower-case hyphenated form, as the bluetooth daemon expects it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Parses the `UUIDs` property of `target` into a set of profiles.
pub(crate) fn parse_uuid_list(
    target: &str,
    uuids: Vec<String>,
) -> Result<BTreeSet<ProfileUuid>, BluezError> {
    uuids
        .iter()
        .map(|uuid| {
            uuid.parse().map_err(|_| BluezError::ProfileQueryFailed {
                target: target.to_string(),
                reason: format!("malformed uuid {:?}", uuid),
            })
        })
        .collect()
}
