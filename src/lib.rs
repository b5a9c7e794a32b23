//! Fountainscout: offline transfer of scouting data over a stream of QR codes
//! using a Luby transform fountain code

pub mod block;
pub mod cli;
pub mod compression;
pub mod config;
pub mod decoder;
pub mod distribution;
pub mod encoder;
pub mod filter;
pub mod import;
pub mod linear_algebra;
pub mod merge;
pub mod packet;
pub mod scouting;
pub mod store;
pub mod transport;

pub use crate::cli::Cli;
pub use crate::decoder::Decoder;
pub use crate::encoder::Encoder;
pub use crate::packet::{DataKind, FountainPacket};
pub use crate::transport::{PacketGenerator, Scanner};
