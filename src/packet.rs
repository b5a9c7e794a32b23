//! JSON wire envelope carried by one QR code.

use crate::block::EncodedBlock;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PACKET_TYPE_SUFFIX: &str = "_fountain_packet";

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("Malformed packet: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("Packet type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Unknown data kind: {0}")]
    UnknownKind(String),
}

/// Data domain carried by a transfer. Each maps to its own packet type tag
/// so a scanner never mixes domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DataKind {
    Scouting,
    Match,
    Scouter,
    Combined,
    PitScouting,
    PitImages,
}

impl DataKind {
    pub const ALL: [DataKind; 6] = [
        DataKind::Scouting,
        DataKind::Match,
        DataKind::Scouter,
        DataKind::Combined,
        DataKind::PitScouting,
        DataKind::PitImages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Scouting => "scouting",
            DataKind::Match => "match",
            DataKind::Scouter => "scouter",
            DataKind::Combined => "combined",
            DataKind::PitScouting => "pit-scouting",
            DataKind::PitImages => "pit-images",
        }
    }

    /// The `type` tag stamped on every packet of this kind
    pub fn packet_type(&self) -> String {
        format!("{}{}", self.as_str(), PACKET_TYPE_SUFFIX)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_suffix(PACKET_TYPE_SUFFIX).unwrap_or(s);
        DataKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| PacketError::UnknownKind(s.to_string()))
    }
}

/// One encoded block plus the session metadata needed to display and scan it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FountainPacket {
    #[serde(rename = "type")]
    pub packet_type: String,
    pub session_id: String,
    /// Emission counter, diagnostic only
    pub packet_id: u64,
    pub k: usize,
    pub bytes: usize,
    pub checksum: String,
    pub indices: Vec<usize>,
    /// Base64 of the block payload
    pub data: String,
}

impl FountainPacket {
    pub fn from_block(kind: DataKind, session_id: &str, packet_id: u64, block: &EncodedBlock) -> Self {
        Self {
            packet_type: kind.packet_type(),
            session_id: session_id.to_string(),
            packet_id,
            k: block.k,
            bytes: block.bytes,
            checksum: block.checksum.clone(),
            indices: block.index_key(),
            data: STANDARD.encode(&block.data),
        }
    }

    /// Parse scanned QR text, accepting only packets of `expected` kind
    pub fn parse(text: &str, expected: DataKind) -> Result<Self, PacketError> {
        let packet: FountainPacket = serde_json::from_str(text.trim())?;
        let expected = expected.packet_type();
        if packet.packet_type != expected {
            return Err(PacketError::TypeMismatch {
                expected,
                found: packet.packet_type,
            });
        }
        Ok(packet)
    }

    /// Serialized form rendered into the QR code
    pub fn to_json(&self) -> Result<String, PacketError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Recover the encoded block. The checksum is carried over, not recomputed,
    /// so the decoder can still detect a garbled payload.
    pub fn to_block(&self) -> Result<EncodedBlock, PacketError> {
        let data = STANDARD.decode(self.data.as_bytes())?;
        Ok(EncodedBlock {
            k: self.k,
            bytes: self.bytes,
            indices: self.indices.iter().copied().collect(),
            checksum: self.checksum.clone(),
            data: Bytes::from(data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_block() -> EncodedBlock {
        let indices: BTreeSet<usize> = [1, 4].into_iter().collect();
        EncodedBlock::new(5, 900, indices, Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]))
    }

    #[test]
    fn test_packet_type_tags() {
        assert_eq!(DataKind::Scouting.packet_type(), "scouting_fountain_packet");
        assert_eq!(DataKind::PitScouting.packet_type(), "pit-scouting_fountain_packet");
        assert_eq!(DataKind::PitImages.packet_type(), "pit-images_fountain_packet");
        for kind in DataKind::ALL {
            assert_eq!(kind.packet_type().parse::<DataKind>().unwrap(), kind);
            assert_eq!(kind.as_str().parse::<DataKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<DataKind>().is_err());
    }

    #[test]
    fn test_wire_format_field_names() {
        let packet = FountainPacket::from_block(DataKind::Match, "session_1", 7, &sample_block());
        let value: serde_json::Value = serde_json::from_str(&packet.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "match_fountain_packet");
        assert_eq!(value["sessionId"], "session_1");
        assert_eq!(value["packetId"], 7);
        assert_eq!(value["k"], 5);
        assert_eq!(value["bytes"], 900);
        assert_eq!(value["indices"], serde_json::json!([1, 4]));
        assert_eq!(value["data"], "3q2+7w==");
    }

    #[test]
    fn test_parse_recovers_block() {
        let block = sample_block();
        let packet = FountainPacket::from_block(DataKind::Scouting, "s", 0, &block);
        let parsed = FountainPacket::parse(&packet.to_json().unwrap(), DataKind::Scouting).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.to_block().unwrap(), block);
    }

    #[test]
    fn test_scenario_d_type_mismatch() {
        let packet = FountainPacket::from_block(DataKind::Match, "s", 0, &sample_block());
        let err = FountainPacket::parse(&packet.to_json().unwrap(), DataKind::Scouting).unwrap_err();
        assert!(matches!(
            err,
            PacketError::TypeMismatch { ref expected, ref found }
                if expected == "scouting_fountain_packet" && found == "match_fountain_packet"
        ));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            FountainPacket::parse("https://example.com", DataKind::Scouting),
            Err(PacketError::MalformedJson(_))
        ));
        assert!(matches!(
            FountainPacket::parse(r#"{"type":"scouting_fountain_packet"}"#, DataKind::Scouting),
            Err(PacketError::MalformedJson(_))
        ));

        let mut packet = FountainPacket::from_block(DataKind::Scouting, "s", 0, &sample_block());
        packet.data = "not base64!".to_string();
        assert!(matches!(packet.to_block(), Err(PacketError::InvalidBase64(_))));
    }

    #[test]
    fn test_garbled_payload_fails_checksum() {
        let mut packet = FountainPacket::from_block(DataKind::Scouting, "s", 0, &sample_block());
        packet.data = STANDARD.encode([0u8, 1, 2, 3]);
        assert!(!packet.to_block().unwrap().verify());
    }
}
