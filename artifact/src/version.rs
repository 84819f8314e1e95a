use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::{Mutex, const_mutex};
use rand::Rng;
use serde::{Deserialize, Serialize};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const STAMP_LEN: usize = 15;
const ID_LEN: usize = STAMP_LEN + 1 + 3 + 1 + 4;

/// A sortable artifact version identifier, `YYYYMMDD_HHMMSS_mmm_xxxx`.
///
/// The UTC timestamp with millisecond resolution is followed by a random 16 bit hex suffix. Ids
/// are ordered by their string, which is the same as ordering by (timestamp, suffix).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionId(String);

/// A version id that doesn't follow the `YYYYMMDD_HHMMSS_mmm_xxxx` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVersionId(pub String);

impl fmt::Display for InvalidVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version id {:?}", self.0)
    }
}

impl std::error::Error for InvalidVersionId {}

impl VersionId {
    /// Creates the id of the given instant, sub-millisecond precision is dropped.
    pub fn new(at: DateTime<Utc>, suffix: u16) -> Self {
        let millis = at.timestamp_subsec_millis().min(999);
        Self(format!("{}_{millis:03}_{suffix:04x}", at.format(STAMP_FORMAT)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The instant encoded in the id.
    pub fn timestamp(&self) -> DateTime<Utc> {
        // Both parts were checked when the id was built.
        let stamp = NaiveDateTime::parse_from_str(&self.0[..STAMP_LEN], STAMP_FORMAT)
            .map(|t| t.and_utc())
            .unwrap_or_default();
        let millis: i64 = self.0[STAMP_LEN + 1..STAMP_LEN + 4].parse().unwrap_or_default();

        stamp + chrono::Duration::milliseconds(millis)
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp().timestamp_millis()
    }
}

impl FromStr for VersionId {
    type Err = InvalidVersionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersionId(s.to_string());
        let bytes = s.as_bytes();

        if bytes.len() != ID_LEN
            || bytes[STAMP_LEN] != b'_'
            || bytes[STAMP_LEN + 4] != b'_'
            || !bytes[STAMP_LEN + 1..STAMP_LEN + 4].iter().all(u8::is_ascii_digit)
            || !bytes[STAMP_LEN + 5..]
                .iter()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
        {
            return Err(invalid());
        }

        NaiveDateTime::parse_from_str(&s[..STAMP_LEN], STAMP_FORMAT).map_err(|_| invalid())?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for VersionId {
    type Error = InvalidVersionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionId> for String {
    fn from(value: VersionId) -> Self {
        value.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which artifact version to load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionSelector {
    /// The highest version in the store, resolved when loading.
    #[default]
    Latest,
    Pinned(VersionId),
}

impl FromStr for VersionSelector {
    type Err = InvalidVersionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "latest" => Ok(Self::Latest),
            id => id.parse().map(Self::Pinned),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Pinned(id) => id.fmt(f),
        }
    }
}

/// Issues version ids whose timestamps strictly increase.
pub struct VersionClock {
    last_millis: Mutex<i64>,
}

static GLOBAL_CLOCK: VersionClock = VersionClock {
    last_millis: const_mutex(i64::MIN),
};

impl VersionClock {
    pub const fn new() -> Self {
        Self {
            last_millis: const_mutex(i64::MIN),
        }
    }

    /// The clock shared by the whole process.
    pub fn global() -> &'static Self {
        &GLOBAL_CLOCK
    }

    /// Issues a new id, later than every id this clock issued before and than `floor`.
    ///
    /// # Arguments
    /// * `floor` - An id the new one must sort after, usually the store's latest.
    ///
    /// # Returns
    /// The new version id.
    pub fn next(&self, floor: Option<&VersionId>) -> VersionId {
        let mut last = self.last_millis.lock();

        let floor = floor.map_or(i64::MIN, VersionId::timestamp_millis);
        let millis = Utc::now()
            .timestamp_millis()
            .max(last.saturating_add(1))
            .max(floor.saturating_add(1));
        *last = millis;

        let at = DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
        VersionId::new(at, rand::rng().random())
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}
