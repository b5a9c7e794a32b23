//! Field-dictionary compression for scouting collections.
//!
//! Verbose field names collapse to one or two letter keys, scouter and event
//! names become indices into per-payload dictionaries, boolean groups pack
//! into bit fields and count groups into arrays. The resulting JSON is then
//! gzipped. Decoders tell compressed from plain payloads by the gzip magic.

use crate::scouting::{Alliance, ScoutingData, ScoutingDataCollection, ScoutingEntry};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use thiserror::Error;

/// First two bytes of every gzip stream
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Envelope format version written into `meta`
pub const FORMAT_VERSION: u32 = 1;

/// Below this size compression rarely pays for the gzip header
pub const MIN_COMPRESSIBLE_BYTES: usize = 256;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to deflate payload: {0}")]
    Deflate(std::io::Error),
    #[error("Failed to inflate payload: {0}")]
    Inflate(std::io::Error),
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Compressed entry {index} has no id")]
    MissingId { index: usize },
    #[error("Compressed entry {index} references {dictionary} dictionary slot {slot} of {len}")]
    DictionaryIndex {
        index: usize,
        dictionary: &'static str,
        slot: u16,
        len: usize,
    },
    #[error("Compressed entry {index} has unknown alliance code {code}")]
    UnknownAlliance { index: usize, code: u8 },
}

/// A dictionary-coded string: either a slot in the payload's dictionary or
/// the value itself when it is not in the dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictRef {
    Index(u16),
    Inline(String),
}

/// Distinct values in first-seen order
#[derive(Debug, Clone, Default)]
struct Dictionary {
    values: Vec<String>,
    slots: HashMap<String, u16>,
}

impl Dictionary {
    fn build<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut dictionary = Self::default();
        for value in values {
            if value.is_empty() || dictionary.slots.contains_key(value) {
                continue;
            }
            let Ok(slot) = u16::try_from(dictionary.values.len()) else {
                break;
            };
            dictionary.slots.insert(value.to_string(), slot);
            dictionary.values.push(value.to_string());
        }
        dictionary
    }

    fn encode(&self, value: &str) -> Option<DictRef> {
        if value.is_empty() {
            return None;
        }
        Some(match self.slots.get(value) {
            Some(&slot) => DictRef::Index(slot),
            None => DictRef::Inline(value.to_string()),
        })
    }
}

fn resolve(
    reference: &Option<DictRef>,
    dictionary: &[String],
    name: &'static str,
    index: usize,
) -> Result<String, CodecError> {
    match reference {
        None => Ok(String::new()),
        Some(DictRef::Inline(value)) => Ok(value.clone()),
        Some(DictRef::Index(slot)) => dictionary
            .get(*slot as usize)
            .cloned()
            .ok_or(CodecError::DictionaryIndex {
                index,
                dictionary: name,
                slot: *slot,
                len: dictionary.len(),
            }),
    }
}

/// Read and write one group of counters as a short array
macro_rules! count_group {
    ($get:ident, $set:ident, [$($field:ident),+ $(,)?]) => {
        fn $get(data: &ScoutingData) -> Vec<u32> {
            trim_zeros(vec![$(data.$field),+])
        }

        fn $set(data: &mut ScoutingData, values: &[u32]) {
            let mut values = values.iter().copied();
            $(data.$field = values.next().unwrap_or(0);)+
        }
    };
}

/// Read and write one group of flags as a bit field, bit `i` for the `i`th flag
macro_rules! flag_group {
    ($get:ident, $set:ident, [$($field:ident),+ $(,)?]) => {
        fn $get(data: &ScoutingData) -> u8 {
            let mut bits = 0u8;
            for (bit, set) in [$(data.$field),+].into_iter().enumerate() {
                if set {
                    bits |= 1 << bit;
                }
            }
            bits
        }

        fn $set(data: &mut ScoutingData, bits: u8) {
            let mut bit = 0;
            $(
                data.$field = bits & (1 << bit) != 0;
                bit += 1;
            )+
            let _ = bit;
        }
    };
}

count_group!(auto_coral, set_auto_coral, [
    auto_coral_place_l1_count,
    auto_coral_place_l2_count,
    auto_coral_place_l3_count,
    auto_coral_place_l4_count,
    auto_coral_place_drop_miss_count,
]);

count_group!(auto_other, set_auto_other, [
    auto_coral_pick_preload_count,
    auto_coral_pick_station_count,
    auto_coral_pick_mark1_count,
    auto_coral_pick_mark2_count,
    auto_coral_pick_mark3_count,
    auto_algae_pick_reef_count,
    auto_algae_pick_mark1_count,
    auto_algae_pick_mark2_count,
    auto_algae_pick_mark3_count,
]);

count_group!(auto_algae, set_auto_algae, [
    auto_algae_place_net_shot,
    auto_algae_place_processor,
    auto_algae_place_drop_miss,
    auto_algae_place_remove,
]);

count_group!(teleop_coral, set_teleop_coral, [
    teleop_coral_place_l1_count,
    teleop_coral_place_l2_count,
    teleop_coral_place_l3_count,
    teleop_coral_place_l4_count,
    teleop_coral_place_drop_miss_count,
    teleop_coral_pick_station_count,
    teleop_coral_pick_carpet_count,
]);

count_group!(teleop_algae, set_teleop_algae, [
    teleop_algae_place_net_shot,
    teleop_algae_place_processor,
    teleop_algae_place_drop_miss,
    teleop_algae_place_remove,
    teleop_algae_pick_reef_count,
    teleop_algae_pick_carpet_count,
]);

flag_group!(start_positions, set_start_positions, [
    start_poses0,
    start_poses1,
    start_poses2,
    start_poses3,
    start_poses4,
    start_poses5,
]);

flag_group!(auto_flags, set_auto_flags, [auto_passed_start_line]);

flag_group!(endgame_flags, set_endgame_flags, [
    shallow_climb_attempted,
    deep_climb_attempted,
    park_attempted,
    climb_failed,
    played_defense,
    broke_down,
]);

fn trim_zeros(mut values: Vec<u32>) -> Vec<u32> {
    while values.last() == Some(&0) {
        values.pop();
    }
    values
}

/// A scouting entry with short keys and dictionary references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireEntry", into = "WireEntry")]
pub struct CompressedEntry {
    pub id: Option<String>,
    /// 0 red, 1 blue
    pub alliance: Option<u8>,
    pub scouter: Option<DictRef>,
    pub event: Option<DictRef>,
    pub match_number: Option<String>,
    pub team: Option<String>,
    pub start_positions: u8,
    pub auto_flags: u8,
    pub endgame: u8,
    pub auto_coral: Vec<u32>,
    pub auto_other: Vec<u32>,
    pub auto_algae: Vec<u32>,
    pub teleop_coral: Vec<u32>,
    pub teleop_algae: Vec<u32>,
    pub comment: Option<String>,
    pub timestamp: Option<u64>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl CompressedEntry {
    fn compress(entry: &ScoutingEntry, scouters: &Dictionary, events: &Dictionary) -> Self {
        let data = &entry.data;
        Self {
            id: Some(entry.id.clone()),
            alliance: data.alliance.map(|a| match a {
                Alliance::RedAlliance => 0,
                Alliance::BlueAlliance => 1,
            }),
            scouter: scouters.encode(&data.scouter_initials),
            event: events.encode(&data.event_name),
            match_number: non_empty(&data.match_number),
            team: non_empty(&data.select_team),
            start_positions: start_positions(data),
            auto_flags: auto_flags(data),
            endgame: endgame_flags(data),
            auto_coral: auto_coral(data),
            auto_other: auto_other(data),
            auto_algae: auto_algae(data),
            teleop_coral: teleop_coral(data),
            teleop_algae: teleop_algae(data),
            comment: non_empty(&data.comment),
            timestamp: (entry.timestamp != 0).then_some(entry.timestamp),
        }
    }

    /// Rebuild the full entry. `index` identifies the entry in errors.
    pub fn expand(&self, index: usize, meta: &CompressionMeta) -> Result<ScoutingEntry, CodecError> {
        let id = self.id.clone().ok_or(CodecError::MissingId { index })?;

        let alliance = match self.alliance {
            None => None,
            Some(0) => Some(Alliance::RedAlliance),
            Some(1) => Some(Alliance::BlueAlliance),
            Some(code) => return Err(CodecError::UnknownAlliance { index, code }),
        };

        let mut data = ScoutingData {
            match_number: self.match_number.clone().unwrap_or_default(),
            alliance,
            scouter_initials: resolve(&self.scouter, &meta.scouter_dict, "scouter", index)?,
            select_team: self.team.clone().unwrap_or_default(),
            event_name: resolve(&self.event, &meta.event_dict, "event", index)?,
            comment: self.comment.clone().unwrap_or_default(),
            ..ScoutingData::default()
        };
        set_start_positions(&mut data, self.start_positions);
        set_auto_flags(&mut data, self.auto_flags);
        set_endgame_flags(&mut data, self.endgame);
        set_auto_coral(&mut data, &self.auto_coral);
        set_auto_other(&mut data, &self.auto_other);
        set_auto_algae(&mut data, &self.auto_algae);
        set_teleop_coral(&mut data, &self.teleop_coral);
        set_teleop_algae(&mut data, &self.teleop_algae);

        Ok(ScoutingEntry {
            id,
            data,
            timestamp: self.timestamp.unwrap_or(0),
        })
    }
}

fn is_zero(value: &u8) -> bool {
    *value == 0
}

/// Short-key JSON layout of [`CompressedEntry`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    a: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ef: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    m: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    p: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    af: u8,
    #[serde(default, skip_serializing_if = "is_zero")]
    g: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ac: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ao: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    aa: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tc: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ta: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ts: Option<u64>,
}

fn split_ref(reference: Option<DictRef>) -> (Option<u16>, Option<String>) {
    match reference {
        Some(DictRef::Index(slot)) => (Some(slot), None),
        Some(DictRef::Inline(value)) => (None, Some(value)),
        None => (None, None),
    }
}

fn join_ref(index: Option<u16>, inline: Option<String>) -> Option<DictRef> {
    index
        .map(DictRef::Index)
        .or_else(|| inline.map(DictRef::Inline))
}

impl From<CompressedEntry> for WireEntry {
    fn from(entry: CompressedEntry) -> Self {
        let (s, sf) = split_ref(entry.scouter);
        let (e, ef) = split_ref(entry.event);
        Self {
            id: entry.id,
            a: entry.alliance,
            s,
            sf,
            e,
            ef,
            m: entry.match_number,
            t: entry.team,
            p: entry.start_positions,
            af: entry.auto_flags,
            g: entry.endgame,
            ac: entry.auto_coral,
            ao: entry.auto_other,
            aa: entry.auto_algae,
            tc: entry.teleop_coral,
            ta: entry.teleop_algae,
            c: entry.comment,
            ts: entry.timestamp,
        }
    }
}

impl From<WireEntry> for CompressedEntry {
    fn from(wire: WireEntry) -> Self {
        Self {
            id: wire.id,
            alliance: wire.a,
            scouter: join_ref(wire.s, wire.sf),
            event: join_ref(wire.e, wire.ef),
            match_number: wire.m,
            team: wire.t,
            start_positions: wire.p,
            auto_flags: wire.af,
            endgame: wire.g,
            auto_coral: wire.ac,
            auto_other: wire.ao,
            auto_algae: wire.aa,
            teleop_coral: wire.tc,
            teleop_algae: wire.ta,
            comment: wire.c,
            timestamp: wire.ts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionMeta {
    pub compressed: bool,
    #[serde(default)]
    pub scouter_dict: Vec<String>,
    #[serde(default)]
    pub event_dict: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedEnvelope {
    pub meta: CompressionMeta,
    pub entries: Vec<CompressedEntry>,
}

impl CompressedEnvelope {
    /// Build fresh dictionaries and compress every entry against them
    pub fn from_collection(collection: &ScoutingDataCollection) -> Self {
        let scouters = Dictionary::build(
            collection
                .entries
                .iter()
                .map(|e| e.data.scouter_initials.as_str()),
        );
        let events =
            Dictionary::build(collection.entries.iter().map(|e| e.data.event_name.as_str()));

        let entries = collection
            .entries
            .iter()
            .map(|entry| CompressedEntry::compress(entry, &scouters, &events))
            .collect();

        Self {
            meta: CompressionMeta {
                compressed: true,
                scouter_dict: scouters.values,
                event_dict: events.values,
                version: Some(FORMAT_VERSION),
            },
            entries,
        }
    }

    pub fn expand(&self) -> Result<ScoutingDataCollection, CodecError> {
        let entries = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.expand(index, &self.meta))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScoutingDataCollection::new(entries))
    }
}

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes).map_err(CodecError::Deflate)?;
    encoder.finish().map_err(CodecError::Deflate)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .map_err(CodecError::Inflate)?;
    Ok(inflated)
}

/// Dictionary-compress and gzip a collection
pub fn compress(collection: &ScoutingDataCollection) -> Result<Vec<u8>, CodecError> {
    let envelope = CompressedEnvelope::from_collection(collection);
    let json = serde_json::to_vec(&envelope)?;
    let compressed = gzip(&json)?;
    debug!(
        "compressed {} entries: {} byte envelope, {} bytes gzipped",
        collection.len(),
        json.len(),
        compressed.len()
    );
    Ok(compressed)
}

/// Decode a received payload to JSON, expanding compressed envelopes
pub fn decompress(bytes: &[u8]) -> Result<Value, CodecError> {
    let value: Value = if is_gzip(bytes) {
        serde_json::from_slice(&gunzip(bytes)?)?
    } else {
        serde_json::from_slice(bytes)?
    };

    if value.pointer("/meta/compressed") == Some(&Value::Bool(true)) {
        let envelope: CompressedEnvelope = serde_json::from_value(value)?;
        return Ok(serde_json::to_value(envelope.expand()?)?);
    }
    Ok(value)
}

/// Decode a received payload that must be a scouting collection
pub fn decompress_collection(bytes: &[u8]) -> Result<ScoutingDataCollection, CodecError> {
    Ok(serde_json::from_value(decompress(bytes)?)?)
}

/// Parse `value` as a collection only if doing so loses no fields
pub fn as_scouting_collection(value: &Value) -> Option<ScoutingDataCollection> {
    let entries = value.get("entries")?.as_array()?;
    if value.as_object()?.len() != 1 {
        return None;
    }

    let collection: ScoutingDataCollection = serde_json::from_value(value.clone()).ok()?;
    for (raw, parsed) in entries.iter().zip(&collection.entries) {
        let raw = raw.as_object()?;
        if raw.keys().any(|key| !matches!(key.as_str(), "id" | "data" | "timestamp")) {
            return None;
        }
        let typed = serde_json::to_value(&parsed.data).ok()?;
        let typed = typed.as_object()?;
        if raw.get("data")?.as_object()?.keys().any(|key| !typed.contains_key(key)) {
            return None;
        }
    }
    Some(collection)
}

/// Compression applies to non-empty scouting collections large enough to benefit
pub fn should_use_compression(value: &Value, raw_len: usize) -> bool {
    raw_len >= MIN_COMPRESSIBLE_BYTES
        && as_scouting_collection(value).is_some_and(|collection| !collection.is_empty())
}

/// Serialize any payload for transfer, compressing when it pays off
pub fn encode_payload(value: &Value) -> Result<Vec<u8>, CodecError> {
    let raw = serde_json::to_vec(value)?;
    if !should_use_compression(value, raw.len()) {
        return Ok(raw);
    }
    let Some(collection) = as_scouting_collection(value) else {
        return Ok(raw);
    };

    let compressed = compress(&collection)?;
    if compressed.len() < raw.len() {
        debug!("payload {} -> {} bytes", raw.len(), compressed.len());
        Ok(compressed)
    } else {
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_collection() -> ScoutingDataCollection {
        let mut entries = Vec::new();
        for (i, (scouter, team)) in [("AB", "254"), ("CD", "1678"), ("AB", "971"), ("EF", "118")]
            .into_iter()
            .enumerate()
        {
            let data = ScoutingData {
                match_number: (i + 1).to_string(),
                alliance: Some(if i % 2 == 0 {
                    Alliance::RedAlliance
                } else {
                    Alliance::BlueAlliance
                }),
                scouter_initials: scouter.to_string(),
                select_team: team.to_string(),
                event_name: "2025casj".to_string(),
                start_poses1: i == 1,
                start_poses5: true,
                auto_coral_place_l4_count: i as u32,
                auto_coral_pick_mark3_count: 1,
                auto_algae_place_processor: 2,
                auto_passed_start_line: true,
                teleop_coral_place_l2_count: 5,
                teleop_coral_pick_carpet_count: 3,
                teleop_algae_pick_carpet_count: 4,
                deep_climb_attempted: i == 2,
                broke_down: i == 3,
                comment: if i == 0 { "fast cycles".into() } else { String::new() },
                ..ScoutingData::default()
            };
            entries.push(ScoutingEntry::from_data(data, 1_700_000_000_000 + i as u64).unwrap());
        }
        ScoutingDataCollection::new(entries)
    }

    #[test]
    fn test_round_trip() {
        let collection = sample_collection();
        let bytes = compress(&collection).unwrap();
        assert!(is_gzip(&bytes));
        assert_eq!(decompress_collection(&bytes).unwrap(), collection);
    }

    #[test]
    fn test_dictionaries_in_first_seen_order() {
        let envelope = CompressedEnvelope::from_collection(&sample_collection());
        assert!(envelope.meta.compressed);
        assert_eq!(envelope.meta.scouter_dict, vec!["AB", "CD", "EF"]);
        assert_eq!(envelope.meta.event_dict, vec!["2025casj"]);
        assert_eq!(envelope.entries[2].scouter, Some(DictRef::Index(0)));
        assert_eq!(envelope.entries[3].scouter, Some(DictRef::Index(2)));
    }

    #[test]
    fn test_short_keys_on_the_wire() {
        let envelope = CompressedEnvelope::from_collection(&sample_collection());
        let value = serde_json::to_value(&envelope).unwrap();
        let first = &value["entries"][0];

        assert_eq!(value["meta"]["scouterDict"], json!(["AB", "CD", "EF"]));
        assert_eq!(first["a"], 0);
        assert_eq!(first["s"], 0);
        assert_eq!(first["e"], 0);
        assert_eq!(first["m"], "1");
        assert_eq!(first["t"], "254");
        assert_eq!(first["p"], 0b100000);
        assert_eq!(first["af"], 1);
        assert_eq!(first["ao"], json!([0, 0, 0, 0, 1]));
        assert_eq!(first["aa"], json!([0, 2]));
        assert_eq!(first["tc"], json!([0, 5, 0, 0, 0, 0, 3]));
        assert_eq!(first["ta"], json!([0, 0, 0, 0, 0, 4]));
        assert_eq!(first["c"], "fast cycles");
        // All-zero groups are omitted
        assert!(first.get("ac").is_none());
        assert!(first.get("g").is_none());
        assert!(first.get("sf").is_none());
    }

    #[test]
    fn test_scenario_c_expansion() {
        let meta = CompressionMeta {
            compressed: true,
            scouter_dict: vec!["AA".into(), "BB".into(), "CC".into()],
            event_dict: vec![],
            version: None,
        };
        let entry: CompressedEntry = serde_json::from_value(json!({
            "id": "x1",
            "a": 0,
            "s": 2,
            "m": "12",
            "t": "254",
            "p": 0b000101,
            "ac": [1, 0, 2, 0]
        }))
        .unwrap();

        let expanded = entry.expand(0, &meta).unwrap();
        let data = &expanded.data;
        assert_eq!(expanded.id, "x1");
        assert_eq!(data.alliance, Some(Alliance::RedAlliance));
        assert_eq!(data.scouter_initials, "CC");
        assert_eq!(data.match_number, "12");
        assert_eq!(data.select_team, "254");
        assert!(data.start_poses0);
        assert!(!data.start_poses1);
        assert!(data.start_poses2);
        assert!(!data.start_poses3 && !data.start_poses4 && !data.start_poses5);
        assert_eq!(data.auto_coral_place_l1_count, 1);
        assert_eq!(data.auto_coral_place_l2_count, 0);
        assert_eq!(data.auto_coral_place_l3_count, 2);
        assert_eq!(data.auto_coral_place_l4_count, 0);
        assert_eq!(data.auto_coral_place_drop_miss_count, 0);
        assert_eq!(data.teleop_algae_place_net_shot, 0);
        assert_eq!(data.event_name, "");
    }

    #[test]
    fn test_inline_fallback() {
        let envelope: CompressedEnvelope = serde_json::from_value(json!({
            "meta": {"compressed": true, "scouterDict": [], "eventDict": ["2025txhou"]},
            "entries": [{"id": "z", "sf": "QQ", "e": 0}]
        }))
        .unwrap();
        assert_eq!(envelope.entries[0].scouter, Some(DictRef::Inline("QQ".into())));

        let collection = envelope.expand().unwrap();
        assert_eq!(collection.entries[0].data.scouter_initials, "QQ");
        assert_eq!(collection.entries[0].data.event_name, "2025txhou");

        let wire = serde_json::to_value(&envelope.entries[0]).unwrap();
        assert_eq!(wire["sf"], "QQ");
        assert!(wire.get("s").is_none());
    }

    #[test]
    fn test_missing_id_is_fatal() {
        let envelope: CompressedEnvelope = serde_json::from_value(json!({
            "meta": {"compressed": true, "scouterDict": [], "eventDict": []},
            "entries": [{"id": "ok"}, {"m": "4"}]
        }))
        .unwrap();
        assert!(matches!(envelope.expand(), Err(CodecError::MissingId { index: 1 })));
    }

    #[test]
    fn test_dictionary_out_of_range() {
        let envelope: CompressedEnvelope = serde_json::from_value(json!({
            "meta": {"compressed": true, "scouterDict": ["AB"], "eventDict": []},
            "entries": [{"id": "a", "s": 1}]
        }))
        .unwrap();
        assert!(matches!(
            envelope.expand(),
            Err(CodecError::DictionaryIndex { index: 0, dictionary: "scouter", slot: 1, len: 1 })
        ));
    }

    #[test]
    fn test_plain_json_passes_through() {
        let value = json!({"scouters": [{"name": "Ada"}]});
        let bytes = encode_payload(&value).unwrap();
        assert!(!is_gzip(&bytes));
        assert_eq!(decompress(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_payload_compresses_collections() {
        let collection = sample_collection();
        let value = serde_json::to_value(&collection).unwrap();
        let raw = serde_json::to_vec(&value).unwrap();
        assert!(should_use_compression(&value, raw.len()));

        let bytes = encode_payload(&value).unwrap();
        assert!(is_gzip(&bytes));
        assert!(bytes.len() < raw.len());
        assert_eq!(decompress_collection(&bytes).unwrap(), collection);
    }

    #[test]
    fn test_lossy_shapes_are_not_compressed() {
        let unknown_field = json!({"entries": [{"id": "a", "data": {"pitNotes": "x"}}]});
        assert!(as_scouting_collection(&unknown_field).is_none());

        let extra_top_level = json!({"entries": [], "scouters": []});
        assert!(as_scouting_collection(&extra_top_level).is_none());

        let empty = json!({"entries": []});
        assert!(as_scouting_collection(&empty).is_some());
        assert!(!should_use_compression(&empty, 10_000));
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let mut bytes = compress(&sample_collection()).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(decompress(&bytes), Err(CodecError::Inflate(_))));

        let not_json = gzip(b"definitely not json").unwrap();
        assert!(matches!(decompress(&not_json), Err(CodecError::Json(_))));
    }
}
