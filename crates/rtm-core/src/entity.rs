//! Entity classes, checkpoint kinds and their cycles.
//!
//! Every tracked entity belongs to an [`EntityClass`]. Each class emits a
//! fixed, repeating sequence of [`CheckpointKind`]s described by a static
//! [`CycleTable`]. Adding a class means adding a variant here and a row to
//! [`CYCLE_TABLES`].

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Class of entity whose lifecycle is being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    /// Table API round lifecycle (start, betstop, deal, finish).
    #[serde(rename = "tableapi")]
    TableApi,
    /// Roulette device state machine (*X;2 .. *X;5).
    Roulette,
    /// Sicbo shaker device.
    SicboShaker,
    /// Sicbo IDP request/response pair.
    SicboIdp,
}

impl EntityClass {
    pub const ALL: [EntityClass; 4] = [
        EntityClass::TableApi,
        EntityClass::Roulette,
        EntityClass::SicboShaker,
        EntityClass::SicboIdp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TableApi => "tableapi",
            Self::Roulette => "roulette",
            Self::SicboShaker => "sicbo_shaker",
            Self::SicboIdp => "sicbo_idp",
        }
    }

    /// Static cycle table for this class.
    pub fn cycle(&self) -> &'static CycleTable {
        match self {
            Self::TableApi => &CYCLE_TABLES[0],
            Self::Roulette => &CYCLE_TABLES[1],
            Self::SicboShaker => &CYCLE_TABLES[2],
            Self::SicboIdp => &CYCLE_TABLES[3],
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tableapi" | "table_api" => Ok(Self::TableApi),
            "roulette" => Ok(Self::Roulette),
            "sicbo_shaker" | "shaker" => Ok(Self::SicboShaker),
            "sicbo_idp" | "idp" => Ok(Self::SicboIdp),
            other => Err(CoreError::UnknownEntityClass(other.to_string())),
        }
    }
}

/// Named lifecycle milestone.
///
/// The variant set is flat; [`CheckpointKind::class`] tells which entity
/// class a kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Start,
    #[serde(rename = "betstop")]
    BetStop,
    Deal,
    Finish,
    X2,
    X3,
    X4,
    X5,
    ShakerStart,
    ShakerS0,
    IdpSend,
    IdpReceive,
}

impl CheckpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::BetStop => "betstop",
            Self::Deal => "deal",
            Self::Finish => "finish",
            Self::X2 => "x2",
            Self::X3 => "x3",
            Self::X4 => "x4",
            Self::X5 => "x5",
            Self::ShakerStart => "shaker_start",
            Self::ShakerS0 => "shaker_s0",
            Self::IdpSend => "idp_send",
            Self::IdpReceive => "idp_receive",
        }
    }

    /// Entity class this checkpoint kind belongs to.
    pub fn class(&self) -> EntityClass {
        match self {
            Self::Start | Self::BetStop | Self::Deal | Self::Finish => EntityClass::TableApi,
            Self::X2 | Self::X3 | Self::X4 | Self::X5 => EntityClass::Roulette,
            Self::ShakerStart | Self::ShakerS0 => EntityClass::SicboShaker,
            Self::IdpSend | Self::IdpReceive => EntityClass::SicboIdp,
        }
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointKind {
    type Err = CoreError;

    /// Accepts the canonical names plus the raw device labels
    /// (`*X;2`, `s0`, ...) that producers tend to forward verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let kind = match normalized.as_str() {
            "start" => Self::Start,
            "betstop" | "bet_stop" => Self::BetStop,
            "deal" => Self::Deal,
            "finish" => Self::Finish,
            "x2" | "*x;2" => Self::X2,
            "x3" | "*x;3" => Self::X3,
            "x4" | "*x;4" => Self::X4,
            "x5" | "*x;5" => Self::X5,
            "shaker_start" | "shakerstart" => Self::ShakerStart,
            "shaker_s0" | "s0" => Self::ShakerS0,
            "idp_send" | "send" => Self::IdpSend,
            "idp_receive" | "receive" => Self::IdpReceive,
            _ => return Err(CoreError::UnknownCheckpointKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Fixed cyclic order of checkpoint kinds for one entity class.
#[derive(Debug)]
pub struct CycleTable {
    pub class: EntityClass,
    pub kinds: &'static [CheckpointKind],
}

impl CycleTable {
    /// First kind of the cycle (the kind that opens a new round).
    pub fn first(&self) -> CheckpointKind {
        self.kinds[0]
    }

    pub fn contains(&self, kind: CheckpointKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Expected successor of `kind`, wrapping at the end of the cycle.
    ///
    /// Returns `None` when `kind` is not part of this cycle.
    pub fn successor(&self, kind: CheckpointKind) -> Option<CheckpointKind> {
        let pos = self.kinds.iter().position(|k| *k == kind)?;
        Some(self.kinds[(pos + 1) % self.kinds.len()])
    }
}

/// Static cycle tables, one per [`EntityClass`] in declaration order.
pub static CYCLE_TABLES: [CycleTable; 4] = [
    CycleTable {
        class: EntityClass::TableApi,
        kinds: &[
            CheckpointKind::Start,
            CheckpointKind::BetStop,
            CheckpointKind::Deal,
            CheckpointKind::Finish,
        ],
    },
    CycleTable {
        class: EntityClass::Roulette,
        kinds: &[
            CheckpointKind::X2,
            CheckpointKind::X3,
            CheckpointKind::X4,
            CheckpointKind::X5,
        ],
    },
    CycleTable {
        class: EntityClass::SicboShaker,
        kinds: &[CheckpointKind::ShakerStart, CheckpointKind::ShakerS0],
    },
    CycleTable {
        class: EntityClass::SicboIdp,
        kinds: &[CheckpointKind::IdpSend, CheckpointKind::IdpReceive],
    },
];

/// Composite identity of a tracked entity.
///
/// Format: `{class}:{game_type}:{entity_id}:{round_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub class: EntityClass,
    pub game_type: String,
    /// Table or device identifier.
    pub entity_id: String,
    pub round_id: String,
}

impl EntityKey {
    pub fn new(
        class: EntityClass,
        game_type: impl Into<String>,
        entity_id: impl Into<String>,
        round_id: impl Into<String>,
    ) -> Self {
        Self {
            class,
            game_type: game_type.into(),
            entity_id: entity_id.into(),
            round_id: round_id.into(),
        }
    }

    /// Same entity with the round component cleared.
    pub fn without_round(&self) -> Self {
        Self {
            class: self.class,
            game_type: self.game_type.clone(),
            entity_id: self.entity_id.clone(),
            round_id: String::new(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.class, self.game_type, self.entity_id, self.round_id
        )
    }
}
