//! Match scouting records as they are stored and transferred.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Alliance {
    RedAlliance,
    BlueAlliance,
}

/// Everything one scouter records about one robot in one match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoutingData {
    pub match_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance: Option<Alliance>,
    pub scouter_initials: String,
    pub select_team: String,
    pub event_name: String,

    pub start_poses0: bool,
    pub start_poses1: bool,
    pub start_poses2: bool,
    pub start_poses3: bool,
    pub start_poses4: bool,
    pub start_poses5: bool,

    pub auto_coral_place_l1_count: u32,
    pub auto_coral_place_l2_count: u32,
    pub auto_coral_place_l3_count: u32,
    pub auto_coral_place_l4_count: u32,
    pub auto_coral_place_drop_miss_count: u32,
    pub auto_coral_pick_preload_count: u32,
    pub auto_coral_pick_station_count: u32,
    pub auto_coral_pick_mark1_count: u32,
    pub auto_coral_pick_mark2_count: u32,
    pub auto_coral_pick_mark3_count: u32,
    pub auto_algae_place_net_shot: u32,
    pub auto_algae_place_processor: u32,
    pub auto_algae_place_drop_miss: u32,
    pub auto_algae_place_remove: u32,
    pub auto_algae_pick_reef_count: u32,
    pub auto_algae_pick_mark1_count: u32,
    pub auto_algae_pick_mark2_count: u32,
    pub auto_algae_pick_mark3_count: u32,
    pub auto_passed_start_line: bool,

    pub teleop_coral_place_l1_count: u32,
    pub teleop_coral_place_l2_count: u32,
    pub teleop_coral_place_l3_count: u32,
    pub teleop_coral_place_l4_count: u32,
    pub teleop_coral_place_drop_miss_count: u32,
    pub teleop_coral_pick_station_count: u32,
    pub teleop_coral_pick_carpet_count: u32,
    pub teleop_algae_place_net_shot: u32,
    pub teleop_algae_place_processor: u32,
    pub teleop_algae_place_drop_miss: u32,
    pub teleop_algae_place_remove: u32,
    pub teleop_algae_pick_reef_count: u32,
    pub teleop_algae_pick_carpet_count: u32,

    pub shallow_climb_attempted: bool,
    pub deep_climb_attempted: bool,
    pub park_attempted: bool,
    pub climb_failed: bool,
    pub played_defense: bool,
    pub broke_down: bool,

    pub comment: String,
}

impl ScoutingData {
    /// Match number with any level prefix (`qm`, `sf`, ...) stripped
    pub fn match_number_value(&self) -> Option<u32> {
        leading_number(&self.match_number)
    }

    /// Team number with any `frc` prefix stripped
    pub fn team_number(&self) -> Option<u32> {
        leading_number(&self.select_team)
    }
}

/// Digits of `raw` after skipping any non-digit prefix
pub(crate) fn leading_number(raw: &str) -> Option<u32> {
    let digits: String = raw
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// One stored record. `id` is derived from the content, so the same
/// observation has the same id on every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoutingEntry {
    pub id: String,
    pub data: ScoutingData,
    #[serde(default)]
    pub timestamp: u64,
}

impl ScoutingEntry {
    pub fn from_data(data: ScoutingData, timestamp: u64) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: content_id(&data)?,
            data,
            timestamp,
        })
    }
}

/// Truncated blake3 digest of the serialized record
pub fn content_id(data: &ScoutingData) -> Result<String, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, data)?;
    Ok(hasher.finalize().to_hex().as_str()[..24].to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoutingDataCollection {
    pub entries: Vec<ScoutingEntry>,
}

impl ScoutingDataCollection {
    pub fn new(entries: Vec<ScoutingEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
