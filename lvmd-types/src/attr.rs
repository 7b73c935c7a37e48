// SPDX-License-Identifier: GPL-3.0-only

//! Decoder for the 10-character `lv_attr` string reported by `lvs`.
//!
//! Each position is a single flag character; see `lvs(8)` for the reference
//! table. [`LvAttr`] decodes every position into a closed enum and
//! re-encodes losslessly through its `Display` implementation.
//! [`LvAttr::verify_health`] maps the known unhealthy combinations onto
//! [`HealthError`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of characters in an `lv_attr` string.
pub const LV_ATTR_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttrError {
    #[error("lv_attr {attr:?} has {len} characters, expected {LV_ATTR_LEN}")]
    Length { attr: String, len: usize },

    #[error("unknown {field} flag {flag:?}")]
    UnknownFlag { field: &'static str, flag: char },
}

macro_rules! attr_field {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $flag:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in table order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_char(self) -> char {
                match self {
                    $($name::$variant => $flag),+
                }
            }
        }

        impl TryFrom<char> for $name {
            type Error = AttrError;

            fn try_from(flag: char) -> Result<Self, AttrError> {
                match flag {
                    $($flag => Ok($name::$variant),)+
                    other => Err(AttrError::UnknownFlag {
                        field: stringify!($name),
                        flag: other,
                    }),
                }
            }
        }
    };
}

attr_field! {
    /// Position 1: volume type.
    VolumeType {
        Cache = 'C',
        Mirrored = 'm',
        MirroredNoInitialSync = 'M',
        Origin = 'o',
        OriginWithMergingSnapshot = 'O',
        Integrity = 'g',
        Raid = 'r',
        RaidNoInitialSync = 'R',
        Snapshot = 's',
        MergingSnapshot = 'S',
        PvMove = 'p',
        Virtual = 'v',
        Image = 'i',
        ImageOutOfSync = 'I',
        MirrorLog = 'l',
        UnderConversion = 'c',
        ThinVolume = 'V',
        ThinPool = 't',
        ThinPoolData = 'T',
        VdoPool = 'd',
        VdoPoolData = 'D',
        Metadata = 'e',
        None = '-',
    }
}

attr_field! {
    /// Position 2: permissions.
    Permissions {
        Writeable = 'w',
        ReadOnly = 'r',
        ReadOnlyActivation = 'R',
        None = '-',
    }
}

attr_field! {
    /// Position 3: allocation policy, capitalized when locked.
    AllocationPolicy {
        Anywhere = 'a',
        AnywhereLocked = 'A',
        Contiguous = 'c',
        ContiguousLocked = 'C',
        Inherited = 'i',
        InheritedLocked = 'I',
        Cling = 'l',
        ClingLocked = 'L',
        Normal = 'n',
        NormalLocked = 'N',
        None = '-',
    }
}

attr_field! {
    /// Position 4: fixed minor number.
    Minor {
        Fixed = 'm',
        NotFixed = '-',
    }
}

attr_field! {
    /// Position 5: activation state.
    State {
        Active = 'a',
        Historical = 'h',
        Suspended = 's',
        InvalidSnapshot = 'I',
        InvalidSuspendedSnapshot = 'S',
        SnapshotMergeFailed = 'm',
        SuspendedSnapshotMergeFailed = 'M',
        MappedDeviceWithoutTables = 'd',
        MappedDeviceWithInactiveTable = 'i',
        ThinPoolCheckNeeded = 'c',
        SuspendedThinPoolCheckNeeded = 'C',
        Unknown = 'X',
        Inactive = '-',
    }
}

attr_field! {
    /// Position 6: device open.
    Open {
        Open = 'o',
        Unknown = 'X',
        Closed = '-',
    }
}

attr_field! {
    /// Position 7: target type of the mapped device.
    OpenTarget {
        Cache = 'C',
        Mirror = 'm',
        Raid = 'r',
        Snapshot = 's',
        Thin = 't',
        Unknown = 'u',
        Virtual = 'v',
        Vdo = 'd',
        None = '-',
    }
}

attr_field! {
    /// Position 8: newly allocated blocks are zeroed before use.
    Zero {
        Zero = 'z',
        NoZero = '-',
    }
}

attr_field! {
    /// Position 9: volume health. Several flags are only meaningful for a
    /// particular volume type.
    VolumeHealth {
        Partial = 'p',
        RefreshNeeded = 'r',
        MismatchesExist = 'm',
        WriteMostly = 'w',
        Reshaping = 's',
        ReshapeRemoved = 'R',
        Failed = 'F',
        OutOfData = 'D',
        MetadataReadOnly = 'M',
        Error = 'E',
        Unknown = 'X',
        Ok = '-',
    }
}

attr_field! {
    /// Position 10: activation skip.
    SkipActivation {
        Skip = 'k',
        NoSkip = '-',
    }
}

/// Known unhealthy attribute combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HealthError {
    #[error("found partial LV: one or more physical volumes are missing")]
    PartialActivation,

    #[error("LV health is unknown")]
    HealthUnknown,

    #[error("writecache reported an error")]
    WriteCacheError,

    #[error("thin pool has failed")]
    ThinPoolFailed,

    #[error("thin pool is out of data space")]
    ThinPoolOutOfDataSpace,

    #[error("thin pool metadata is read only")]
    ThinPoolMetadataReadOnly,

    #[error("thin volume has failed")]
    ThinVolumeFailed,

    #[error("RAID needs a refresh")]
    RaidRefreshNeeded,

    #[error("RAID has mismatches")]
    RaidMismatchesExist,

    #[error("RAID is reshaping")]
    RaidReshaping,

    #[error("RAID reshape removed a device")]
    RaidReshapeRemoved,

    #[error("RAID image is write mostly")]
    RaidWriteMostly,

    #[error("device is suspended")]
    DeviceSuspended,

    #[error("snapshot is invalid")]
    InvalidSnapshot,

    #[error("suspended snapshot is invalid")]
    InvalidSuspendedSnapshot,

    #[error("snapshot merge failed")]
    SnapshotMergeFailed,

    #[error("suspended snapshot merge failed")]
    SuspendedSnapshotMergeFailed,

    #[error("mapped device is present without tables")]
    MappedDeviceWithoutTables,

    #[error("mapped device is present with an inactive table")]
    MappedDeviceWithInactiveTable,

    #[error("thin pool needs a check")]
    ThinPoolCheckNeeded,

    #[error("suspended thin pool needs a check")]
    SuspendedThinPoolCheckNeeded,

    #[error("underlying device state is unknown")]
    UnderlyingDeviceStateUnknown,
}

/// Decoded `lv_attr` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LvAttr {
    pub volume_type: VolumeType,
    pub permissions: Permissions,
    pub allocation_policy: AllocationPolicy,
    pub minor: Minor,
    pub state: State,
    pub open: Open,
    pub open_target: OpenTarget,
    pub zero: Zero,
    pub volume_health: VolumeHealth,
    pub skip_activation: SkipActivation,
}

impl LvAttr {
    pub fn parse(attr: &str) -> Result<Self, AttrError> {
        let flags: Vec<char> = attr.chars().collect();
        let [t, p, a, m, s, o, ot, z, h, k] = flags.as_slice() else {
            return Err(AttrError::Length {
                attr: attr.to_string(),
                len: flags.len(),
            });
        };

        Ok(Self {
            volume_type: VolumeType::try_from(*t)?,
            permissions: Permissions::try_from(*p)?,
            allocation_policy: AllocationPolicy::try_from(*a)?,
            minor: Minor::try_from(*m)?,
            state: State::try_from(*s)?,
            open: Open::try_from(*o)?,
            open_target: OpenTarget::try_from(*ot)?,
            zero: Zero::try_from(*z)?,
            volume_health: VolumeHealth::try_from(*h)?,
            skip_activation: SkipActivation::try_from(*k)?,
        })
    }

    pub fn is_thin_pool(&self) -> bool {
        self.volume_type == VolumeType::ThinPool
    }

    pub fn is_raid(&self) -> bool {
        matches!(
            self.volume_type,
            VolumeType::Raid
                | VolumeType::RaidNoInitialSync
                | VolumeType::Image
                | VolumeType::ImageOutOfSync
        )
    }

    /// Returns the first known failure the flags describe, or `Ok(())` when
    /// the combination has no failure mapping.
    pub fn verify_health(&self) -> Result<(), HealthError> {
        match self.volume_health {
            VolumeHealth::Partial => return Err(HealthError::PartialActivation),
            VolumeHealth::Unknown => return Err(HealthError::HealthUnknown),
            VolumeHealth::Error => return Err(HealthError::WriteCacheError),
            _ => {}
        }

        match (self.volume_type, self.volume_health) {
            (VolumeType::ThinPool, VolumeHealth::Failed) => {
                return Err(HealthError::ThinPoolFailed);
            }
            (VolumeType::ThinPool, VolumeHealth::OutOfData) => {
                return Err(HealthError::ThinPoolOutOfDataSpace);
            }
            (VolumeType::ThinPool, VolumeHealth::MetadataReadOnly) => {
                return Err(HealthError::ThinPoolMetadataReadOnly);
            }
            (VolumeType::ThinVolume, VolumeHealth::Failed) => {
                return Err(HealthError::ThinVolumeFailed);
            }
            _ => {}
        }

        if self.is_raid() {
            match self.volume_health {
                VolumeHealth::RefreshNeeded => return Err(HealthError::RaidRefreshNeeded),
                VolumeHealth::MismatchesExist => return Err(HealthError::RaidMismatchesExist),
                VolumeHealth::Reshaping => return Err(HealthError::RaidReshaping),
                VolumeHealth::ReshapeRemoved => return Err(HealthError::RaidReshapeRemoved),
                VolumeHealth::WriteMostly => return Err(HealthError::RaidWriteMostly),
                _ => {}
            }
        }

        match self.state {
            State::Suspended => Err(HealthError::DeviceSuspended),
            State::InvalidSnapshot => Err(HealthError::InvalidSnapshot),
            State::InvalidSuspendedSnapshot => Err(HealthError::InvalidSuspendedSnapshot),
            State::SnapshotMergeFailed => Err(HealthError::SnapshotMergeFailed),
            State::SuspendedSnapshotMergeFailed => Err(HealthError::SuspendedSnapshotMergeFailed),
            State::MappedDeviceWithoutTables => Err(HealthError::MappedDeviceWithoutTables),
            State::MappedDeviceWithInactiveTable => {
                Err(HealthError::MappedDeviceWithInactiveTable)
            }
            State::ThinPoolCheckNeeded => Err(HealthError::ThinPoolCheckNeeded),
            State::SuspendedThinPoolCheckNeeded => Err(HealthError::SuspendedThinPoolCheckNeeded),
            State::Unknown => Err(HealthError::UnderlyingDeviceStateUnknown),
            State::Active | State::Historical | State::Inactive => {
                if self.open == Open::Unknown {
                    Err(HealthError::UnderlyingDeviceStateUnknown)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl FromStr for LvAttr {
    type Err = AttrError;

    fn from_str(attr: &str) -> Result<Self, Self::Err> {
        Self::parse(attr)
    }
}

impl fmt::Display for LvAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            self.volume_type.as_char(),
            self.permissions.as_char(),
            self.allocation_policy.as_char(),
            self.minor.as_char(),
            self.state.as_char(),
            self.open.as_char(),
            self.open_target.as_char(),
            self.zero.as_char(),
            self.volume_health.as_char(),
            self.skip_activation.as_char(),
        ];
        for flag in flags {
            write!(f, "{flag}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy(volume_type: VolumeType) -> LvAttr {
        LvAttr {
            volume_type,
            permissions: Permissions::Writeable,
            allocation_policy: AllocationPolicy::Inherited,
            minor: Minor::NotFixed,
            state: State::Active,
            open: Open::Open,
            open_target: OpenTarget::None,
            zero: Zero::NoZero,
            volume_health: VolumeHealth::Ok,
            skip_activation: SkipActivation::NoSkip,
        }
    }

    #[test]
    fn decodes_real_attributes() {
        let attr = LvAttr::parse("twi-aotz--").expect("thin pool attr");
        assert_eq!(attr.volume_type, VolumeType::ThinPool);
        assert_eq!(attr.permissions, Permissions::Writeable);
        assert_eq!(attr.allocation_policy, AllocationPolicy::Inherited);
        assert_eq!(attr.state, State::Active);
        assert_eq!(attr.open, Open::Open);
        assert_eq!(attr.open_target, OpenTarget::Thin);
        assert_eq!(attr.zero, Zero::Zero);
        assert!(attr.is_thin_pool());
        assert!(attr.verify_health().is_ok());

        let attr = LvAttr::parse("Vri---tz-k").expect("read only thin snapshot attr");
        assert_eq!(attr.volume_type, VolumeType::ThinVolume);
        assert_eq!(attr.permissions, Permissions::ReadOnly);
        assert_eq!(attr.state, State::Inactive);
        assert_eq!(attr.skip_activation, SkipActivation::Skip);
    }

    #[test]
    fn rejects_wrong_length() {
        for attr in ["", "-wi-a-----x", "-wi-a----", "twi-aotz-"] {
            assert!(matches!(
                LvAttr::parse(attr),
                Err(AttrError::Length { .. })
            ));
        }
    }

    #[test]
    fn rejects_unknown_flag() {
        assert_eq!(
            LvAttr::parse("?wi-a-----"),
            Err(AttrError::UnknownFlag {
                field: "VolumeType",
                flag: '?'
            })
        );
    }

    #[test]
    fn every_flag_roundtrips_in_its_position() {
        let base = healthy(VolumeType::None).to_string();
        let positions: [Vec<char>; LV_ATTR_LEN] = [
            VolumeType::ALL.iter().map(|v| v.as_char()).collect(),
            Permissions::ALL.iter().map(|v| v.as_char()).collect(),
            AllocationPolicy::ALL.iter().map(|v| v.as_char()).collect(),
            Minor::ALL.iter().map(|v| v.as_char()).collect(),
            State::ALL.iter().map(|v| v.as_char()).collect(),
            Open::ALL.iter().map(|v| v.as_char()).collect(),
            OpenTarget::ALL.iter().map(|v| v.as_char()).collect(),
            Zero::ALL.iter().map(|v| v.as_char()).collect(),
            VolumeHealth::ALL.iter().map(|v| v.as_char()).collect(),
            SkipActivation::ALL.iter().map(|v| v.as_char()).collect(),
        ];

        for (index, flags) in positions.iter().enumerate() {
            for flag in flags {
                let mut chars: Vec<char> = base.chars().collect();
                chars[index] = *flag;
                let attr: String = chars.into_iter().collect();
                let decoded = LvAttr::parse(&attr).expect("valid attr");
                assert_eq!(decoded.to_string(), attr);
            }
        }
    }

    fn expected_type_health(volume_type: VolumeType, health: VolumeHealth) -> Option<HealthError> {
        let raid = matches!(
            volume_type,
            VolumeType::Raid
                | VolumeType::RaidNoInitialSync
                | VolumeType::Image
                | VolumeType::ImageOutOfSync
        );
        match (volume_type, health) {
            (_, VolumeHealth::Partial) => Some(HealthError::PartialActivation),
            (_, VolumeHealth::Unknown) => Some(HealthError::HealthUnknown),
            (_, VolumeHealth::Error) => Some(HealthError::WriteCacheError),
            (VolumeType::ThinPool, VolumeHealth::Failed) => Some(HealthError::ThinPoolFailed),
            (VolumeType::ThinPool, VolumeHealth::OutOfData) => {
                Some(HealthError::ThinPoolOutOfDataSpace)
            }
            (VolumeType::ThinPool, VolumeHealth::MetadataReadOnly) => {
                Some(HealthError::ThinPoolMetadataReadOnly)
            }
            (VolumeType::ThinVolume, VolumeHealth::Failed) => Some(HealthError::ThinVolumeFailed),
            (_, VolumeHealth::RefreshNeeded) if raid => Some(HealthError::RaidRefreshNeeded),
            (_, VolumeHealth::MismatchesExist) if raid => Some(HealthError::RaidMismatchesExist),
            (_, VolumeHealth::Reshaping) if raid => Some(HealthError::RaidReshaping),
            (_, VolumeHealth::ReshapeRemoved) if raid => Some(HealthError::RaidReshapeRemoved),
            (_, VolumeHealth::WriteMostly) if raid => Some(HealthError::RaidWriteMostly),
            _ => None,
        }
    }

    #[test]
    fn verify_health_covers_every_type_and_health_pair() {
        for volume_type in VolumeType::ALL {
            for health in VolumeHealth::ALL {
                let mut attr = healthy(*volume_type);
                attr.volume_health = *health;
                let expected = expected_type_health(*volume_type, *health);
                assert_eq!(
                    attr.verify_health().err(),
                    expected,
                    "type {volume_type:?} health {health:?}"
                );
            }
        }
    }

    #[test]
    fn verify_health_maps_states() {
        let cases = [
            (State::Active, None),
            (State::Historical, None),
            (State::Inactive, None),
            (State::Suspended, Some(HealthError::DeviceSuspended)),
            (State::InvalidSnapshot, Some(HealthError::InvalidSnapshot)),
            (
                State::InvalidSuspendedSnapshot,
                Some(HealthError::InvalidSuspendedSnapshot),
            ),
            (
                State::SnapshotMergeFailed,
                Some(HealthError::SnapshotMergeFailed),
            ),
            (
                State::SuspendedSnapshotMergeFailed,
                Some(HealthError::SuspendedSnapshotMergeFailed),
            ),
            (
                State::MappedDeviceWithoutTables,
                Some(HealthError::MappedDeviceWithoutTables),
            ),
            (
                State::MappedDeviceWithInactiveTable,
                Some(HealthError::MappedDeviceWithInactiveTable),
            ),
            (
                State::ThinPoolCheckNeeded,
                Some(HealthError::ThinPoolCheckNeeded),
            ),
            (
                State::SuspendedThinPoolCheckNeeded,
                Some(HealthError::SuspendedThinPoolCheckNeeded),
            ),
            (
                State::Unknown,
                Some(HealthError::UnderlyingDeviceStateUnknown),
            ),
        ];
        assert_eq!(cases.len(), State::ALL.len());

        for (state, expected) in cases {
            let mut attr = healthy(VolumeType::None);
            attr.state = state;
            assert_eq!(attr.verify_health().err(), expected, "state {state:?}");
        }
    }

    #[test]
    fn unknown_open_state_is_unhealthy() {
        let mut attr = healthy(VolumeType::None);
        attr.open = Open::Unknown;
        assert_eq!(
            attr.verify_health(),
            Err(HealthError::UnderlyingDeviceStateUnknown)
        );

        attr.open = Open::Closed;
        assert_eq!(attr.verify_health(), Ok(()));
    }

    #[test]
    fn health_flags_take_precedence_over_state() {
        let attr = LvAttr::parse("twi-so--D-").expect("valid attr");
        assert_eq!(attr.verify_health(), Err(HealthError::ThinPoolOutOfDataSpace));
    }
}
