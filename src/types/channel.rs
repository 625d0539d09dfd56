//! Typed channel keys
//!
//! Internally every reading is addressed by a [`ChannelKey`]. The slash-joined
//! string form `sector_<N>/line_<N>/asset_<N>/<sensorType>` only exists at the
//! transport boundary.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Separator between channel segments.
pub const CHANNEL_SEPARATOR: char = '/';

/// Number of segments in a well-formed channel name.
pub const CHANNEL_SEGMENTS: usize = 4;

/// Which hierarchy level a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Sector,
    Line,
    Asset,
    SensorType,
}

impl Segment {
    fn pattern(self) -> &'static Regex {
        static SECTOR: OnceLock<Regex> = OnceLock::new();
        static LINE: OnceLock<Regex> = OnceLock::new();
        static ASSET: OnceLock<Regex> = OnceLock::new();
        static SENSOR: OnceLock<Regex> = OnceLock::new();

        let (cell, src) = match self {
            Segment::Sector => (&SECTOR, r"^sector_[0-9]+$"),
            Segment::Line => (&LINE, r"^line_[0-9]+$"),
            Segment::Asset => (&ASSET, r"^asset_[0-9]+$"),
            Segment::SensorType => (&SENSOR, r"^[a-z][a-z0-9_]*$"),
        };
        #[allow(clippy::expect_used)]
        cell.get_or_init(|| Regex::new(src).expect("static channel pattern"))
    }

    /// Check a single identifier against this level's pattern.
    pub fn accepts(self, id: &str) -> bool {
        self.pattern().is_match(id)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Sector => write!(f, "sector"),
            Segment::Line => write!(f, "line"),
            Segment::Asset => write!(f, "asset"),
            Segment::SensorType => write!(f, "sensor type"),
        }
    }
}

/// Why a channel string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("expected {CHANNEL_SEGMENTS} segments, found {0}")]
    SegmentCount(usize),

    #[error("invalid {segment} segment '{value}'")]
    BadSegment { segment: Segment, value: String },
}

/// Address of one asset in the plant hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId {
    pub sector: String,
    pub line: String,
    pub asset: String,
}

impl AssetId {
    pub fn new(sector: impl Into<String>, line: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            sector: sector.into(),
            line: line.into(),
            asset: asset.into(),
        }
    }

    /// Channel key for one of this asset's sensors.
    pub fn sensor(&self, sensor_type: impl Into<String>) -> ChannelKey {
        ChannelKey {
            sector: self.sector.clone(),
            line: self.line.clone(),
            asset: self.asset.clone(),
            sensor_type: sensor_type.into(),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.sector, self.line, self.asset)
    }
}

impl FromStr for AssetId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(CHANNEL_SEPARATOR).collect();
        if parts.len() != CHANNEL_SEGMENTS - 1 {
            return Err(ChannelError::SegmentCount(parts.len()));
        }
        check(Segment::Sector, parts[0])?;
        check(Segment::Line, parts[1])?;
        check(Segment::Asset, parts[2])?;
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Fully qualified sensor channel: `(sector, line, asset, sensorType)`.
///
/// Also the alarm key: asset ids repeat across lines, so the whole path is
/// needed to identify a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub sector: String,
    pub line: String,
    pub asset: String,
    pub sensor_type: String,
}

impl ChannelKey {
    pub fn new(
        sector: impl Into<String>,
        line: impl Into<String>,
        asset: impl Into<String>,
        sensor_type: impl Into<String>,
    ) -> Self {
        Self {
            sector: sector.into(),
            line: line.into(),
            asset: asset.into(),
            sensor_type: sensor_type.into(),
        }
    }

    pub fn asset_id(&self) -> AssetId {
        AssetId::new(&self.sector, &self.line, &self.asset)
    }

    /// Wire form of the channel name.
    pub fn to_channel(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.sector,
            self.line,
            self.asset,
            self.sensor_type,
            sep = CHANNEL_SEPARATOR
        )
    }
}

impl FromStr for ChannelKey {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(CHANNEL_SEPARATOR).collect();
        if parts.len() != CHANNEL_SEGMENTS {
            return Err(ChannelError::SegmentCount(parts.len()));
        }
        check(Segment::Sector, parts[0])?;
        check(Segment::Line, parts[1])?;
        check(Segment::Asset, parts[2])?;
        check(Segment::SensorType, parts[3])?;
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

fn check(segment: Segment, value: &str) -> Result<(), ChannelError> {
    if segment.accepts(value) {
        Ok(())
    } else {
        Err(ChannelError::BadSegment {
            segment,
            value: value.to_string(),
        })
    }
}
