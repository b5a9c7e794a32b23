//! QR transport: packet generation on the display side, timed carousel
//! cycling, and the scanner that feeds camera reads into a decoder.

use crate::config::TransferConfig;
use crate::decoder::{Decoder, DecoderError};
use crate::encoder::{Encoder, EncoderError};
use crate::packet::{DataKind, FountainPacket, PacketError};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("No packet fits within {limit} bytes")]
    NoPacketsFit { limit: usize },
    #[error("Carousel has no packets to display")]
    EmptyCarousel,
}

/// A fresh, opaque session label
pub fn new_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("session_{}_{:08x}", millis, rand::thread_rng().gen::<u32>())
}

/// The bounded packet list produced for one generation run
#[derive(Debug, Clone)]
pub struct GeneratedPackets {
    pub session_id: String,
    pub kind: DataKind,
    /// Source block count
    pub k: usize,
    pub byte_length: usize,
    pub packets: Vec<FountainPacket>,
    /// Encoder draws consumed
    pub iterations: usize,
    /// Candidates dropped for exceeding the packet size limit
    pub skipped_oversized: usize,
}

/// Turns a payload into a finite, deduplicated, size-checked packet list
#[derive(Debug, Clone)]
pub struct PacketGenerator {
    kind: DataKind,
    config: TransferConfig,
}

impl PacketGenerator {
    pub fn new(kind: DataKind, config: TransferConfig) -> Self {
        Self { kind, config }
    }

    pub fn generate(&self, payload: &[u8]) -> Result<GeneratedPackets, TransportError> {
        let encoder = Encoder::new(payload, self.config.block_size)?;
        self.generate_from(encoder, new_session_id())
    }

    /// Reproducible generation under a caller-chosen session id
    pub fn generate_seeded(
        &self,
        payload: &[u8],
        session_id: &str,
        seed: u64,
    ) -> Result<GeneratedPackets, TransportError> {
        let encoder = Encoder::with_rng(payload, self.config.block_size, StdRng::seed_from_u64(seed))?;
        self.generate_from(encoder, session_id.to_string())
    }

    fn generate_from<R: Rng>(
        &self,
        encoder: Encoder<R>,
        session_id: String,
    ) -> Result<GeneratedPackets, TransportError> {
        let mut encoder = encoder.systematic(self.config.systematic);
        let k = encoder.source_block_count();
        let byte_length = encoder.byte_length();
        let target = self.config.target_packets(k);
        let max_iterations = self.config.max_iterations(k);
        let limit = self.config.max_packet_bytes();

        let mut seen = HashSet::new();
        let mut packets = Vec::with_capacity(target);
        let mut iterations = 0;
        let mut skipped_oversized = 0;

        while packets.len() < target && iterations < max_iterations {
            iterations += 1;
            let block = encoder.next_block()?;
            if !seen.insert(block.index_key()) {
                continue;
            }

            let packet = FountainPacket::from_block(self.kind, &session_id, packets.len() as u64, &block);
            let size = packet.to_json()?.len();
            if size > limit {
                debug!(
                    "dropping {} byte packet over {:?}, limit is {}",
                    size,
                    block.index_key(),
                    limit
                );
                skipped_oversized += 1;
                continue;
            }
            packets.push(packet);
        }

        if packets.is_empty() {
            return Err(TransportError::NoPacketsFit { limit });
        }
        if packets.len() < target {
            warn!(
                "only {} of {} target packets after {} draws",
                packets.len(),
                target,
                iterations
            );
        }
        info!(
            "generated {} {} packets for {} bytes (k = {}) in session {}",
            packets.len(),
            self.kind,
            byte_length,
            k,
            session_id
        );

        Ok(GeneratedPackets {
            session_id,
            kind: self.kind,
            k,
            byte_length,
            packets,
            iterations,
            skipped_oversized,
        })
    }
}

/// Cycles pre-serialized packets at a fixed interval
#[derive(Debug, Clone)]
pub struct PacketCarousel {
    frames: Vec<String>,
    interval: Duration,
    position: usize,
}

impl PacketCarousel {
    pub fn new(packets: &[FountainPacket], interval: Duration) -> Result<Self, TransportError> {
        if packets.is_empty() {
            return Err(TransportError::EmptyCarousel);
        }
        let frames = packets
            .iter()
            .map(FountainPacket::to_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            frames,
            interval,
            position: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> &str {
        &self.frames[self.position]
    }

    /// Step to the next frame, wrapping around
    pub fn advance(&mut self) -> &str {
        self.position = (self.position + 1) % self.frames.len();
        self.current()
    }

    /// Show one frame per tick. Runs `cycles` full loops, or forever with `None`.
    pub async fn run<F>(&mut self, cycles: Option<usize>, mut show: F)
    where
        F: FnMut(usize, &str),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shown = 0usize;
        loop {
            if let Some(cycles) = cycles {
                if shown >= cycles * self.frames.len() {
                    break;
                }
            }
            ticker.tick().await;
            show(self.position, self.current());
            self.advance();
            shown += 1;
        }
    }
}

/// Decode progress as shown to the person holding the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Distinct blocks applied
    pub received: usize,
    pub estimated_needed: usize,
    /// Capped at 99 until the decoder completes
    pub percent: u8,
    pub resolved: usize,
    pub k: usize,
    pub session_id: String,
    /// Gaps in the packet ids seen this session, diagnostic only
    pub missing_packet_ids: Vec<u64>,
}

/// Running estimate of how many blocks the decoder will need
#[derive(Debug, Clone)]
struct ProgressEstimator {
    redundancy: f64,
    estimated_needed: usize,
}

impl ProgressEstimator {
    fn new(redundancy: f64) -> Self {
        Self {
            redundancy,
            estimated_needed: 0,
        }
    }

    fn update(&mut self, received: usize, k: usize) -> (usize, u8) {
        if self.estimated_needed == 0 {
            self.estimated_needed = ((k as f64) * (1.0 + self.redundancy) - 1e-9).ceil().max(1.0) as usize;
        }
        if received >= self.estimated_needed {
            let step = ((k as f64) * 0.1).ceil().max(1.0) as usize;
            self.estimated_needed = received + step;
        }
        let percent = (received * 100 / self.estimated_needed).min(99) as u8;
        (self.estimated_needed, percent)
    }
}

/// Packet ids are untrusted, so gap reports stay short
const MAX_REPORTED_GAPS: usize = 32;

/// Packet ids seen in the current session
#[derive(Debug, Clone, Default)]
struct PacketIdTracker {
    session_id: Option<String>,
    ids: BTreeSet<u64>,
}

impl PacketIdTracker {
    /// Record a packet, returning the previous session id on rotation
    fn record(&mut self, session_id: &str, packet_id: u64) -> Option<String> {
        let rotated = match &self.session_id {
            Some(current) if current != session_id => Some(current.clone()),
            _ => None,
        };
        if rotated.is_some() || self.session_id.is_none() {
            self.session_id = Some(session_id.to_string());
            self.ids.clear();
        }
        self.ids.insert(packet_id);
        rotated
    }

    /// The lowest unseen ids between seen ones, at most `MAX_REPORTED_GAPS`
    fn missing(&self) -> Vec<u64> {
        let mut missing = Vec::new();
        for (&low, &high) in self.ids.iter().zip(self.ids.iter().skip(1)) {
            for id in low + 1..high {
                if missing.len() == MAX_REPORTED_GAPS {
                    return missing;
                }
                missing.push(id);
            }
        }
        missing
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Decoder(#[from] DecoderError),
}

/// Result of feeding one scanned code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// A new block was applied
    Accepted(Progress),
    /// The block's index set was already applied
    Duplicate(Progress),
    /// This scan completed the payload
    Complete(Vec<u8>),
    /// The payload was already complete; the scan was ignored
    Finished,
}

/// Accumulates camera reads of one data kind into a decoder
#[derive(Debug)]
pub struct Scanner {
    kind: DataKind,
    decoder: Decoder,
    estimator: ProgressEstimator,
    tracker: PacketIdTracker,
    completed: bool,
}

impl Scanner {
    pub fn new(kind: DataKind) -> Self {
        Self::with_config(kind, &TransferConfig::default())
    }

    pub fn with_config(kind: DataKind, config: &TransferConfig) -> Self {
        Self {
            kind,
            decoder: Decoder::new(),
            estimator: ProgressEstimator::new(config.redundancy),
            tracker: PacketIdTracker::default(),
            completed: false,
        }
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Feed one raw QR text value.
    ///
    /// Parse, type and checksum failures are returned as errors and leave the
    /// scanner untouched so the caller can keep scanning.
    pub fn scan(&mut self, text: &str) -> Result<ScanStatus, ScanError> {
        let packet = FountainPacket::parse(text, self.kind)?;
        if self.completed {
            return Ok(ScanStatus::Finished);
        }

        let block = packet.to_block()?;
        let applied_before = self.decoder.applied_blocks();
        let complete = self.decoder.add_block(&block)?;

        if let Some(previous) = self.tracker.record(&packet.session_id, packet.packet_id) {
            info!(
                "session changed from {} to {}, keeping {} resolved blocks",
                previous,
                packet.session_id,
                self.decoder.resolved_count()
            );
        }

        if complete {
            self.completed = true;
            return Ok(ScanStatus::Complete(self.decoder.decoded()?));
        }

        let progress = self.progress(&packet.session_id);
        if self.decoder.applied_blocks() > applied_before {
            Ok(ScanStatus::Accepted(progress))
        } else {
            Ok(ScanStatus::Duplicate(progress))
        }
    }

    fn progress(&mut self, session_id: &str) -> Progress {
        let k = self.decoder.source_block_count().unwrap_or(0);
        let received = self.decoder.applied_blocks();
        let (estimated_needed, percent) = self.estimator.update(received, k);
        Progress {
            received,
            estimated_needed,
            percent,
            resolved: self.decoder.resolved_count(),
            k,
            session_id: session_id.to_string(),
            missing_packet_ids: self.tracker.missing(),
        }
    }

    /// Drop all progress and start a fresh session
    pub fn reset(&mut self) {
        debug!("resetting {} scanner", self.kind);
        self.decoder.reset();
        self.estimator.estimated_needed = 0;
        self.tracker = PacketIdTracker::default();
        self.completed = false;
    }
}
