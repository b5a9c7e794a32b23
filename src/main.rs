use anyhow::{bail, Context, Result};
use clap::Parser;
use fountainscout::cli::{Cli, Mode};
use fountainscout::compression::{as_scouting_collection, encode_payload};
use fountainscout::config::TransferConfig;
use fountainscout::filter::{apply_filters, record_export, DataFilters, MatchRange, MatchRangePreset, TeamFilter};
use fountainscout::import::{ImportEvent, ImportSession};
use fountainscout::packet::DataKind;
use fountainscout::store::FileStore;
use fountainscout::transport::{PacketCarousel, PacketGenerator, Scanner};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde_json::Value;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match &cli.config {
        Some(path) => TransferConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => TransferConfig::default(),
    };
    if let Some(speed) = cli.speed {
        config.speed = speed;
    }

    match cli.mode {
        Mode::Send => send(&cli, config).await,
        Mode::Receive => receive(&cli, config).await,
    }
}

async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncRead + Unpin>> {
    Ok(match path {
        Some(path) => Box::new(
            File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    })
}

fn parse_match_range(raw: &str) -> Result<MatchRange> {
    let Some((start, end)) = raw.split_once('-') else {
        bail!("match range must look like START-END, got {:?}", raw);
    };
    let bound = |s: &str| -> Result<Option<u32>> {
        let s = s.trim();
        if s.is_empty() {
            Ok(None)
        } else {
            Ok(Some(s.parse().with_context(|| format!("bad match number {:?}", s))?))
        }
    };
    Ok(MatchRange::Custom {
        custom_start: bound(start)?,
        custom_end: bound(end)?,
    })
}

fn filters_from(cli: &Cli) -> Result<DataFilters> {
    let match_range = if let Some(raw) = &cli.matches {
        parse_match_range(raw)?
    } else if cli.from_last_export {
        MatchRange::Preset {
            preset: MatchRangePreset::FromLastExport,
        }
    } else {
        let preset = match cli.last.as_deref() {
            Some("10") => MatchRangePreset::Last10,
            Some("15") => MatchRangePreset::Last15,
            Some("30") => MatchRangePreset::Last30,
            _ => MatchRangePreset::All,
        };
        MatchRange::Preset { preset }
    };

    Ok(DataFilters {
        match_range,
        teams: TeamFilter {
            include_all: cli.teams.is_empty(),
            selected_teams: cli.teams.clone(),
        },
    })
}

async fn send(cli: &Cli, config: TransferConfig) -> Result<()> {
    let mut raw = Vec::new();
    open_input(cli.file.as_deref()).await?.read_to_end(&mut raw).await?;
    let mut value: Value = serde_json::from_slice(&raw).context("payload is not JSON")?;

    let mut store = None;
    if cli.kind == DataKind::Scouting {
        if let Some(collection) = as_scouting_collection(&value) {
            let opened = FileStore::open(&cli.store)?;
            if cli.has_filters() {
                let (filtered, summary) = apply_filters(&collection, &filters_from(cli)?, &opened, &config);
                if filtered.is_empty() {
                    bail!("no entries left after filtering {} entries", summary.original);
                }
                value = serde_json::to_value(&filtered)?;
            }
            store = Some((opened, value.clone()));
        }
    } else if cli.has_filters() {
        warn!("filters only apply to scouting data, sending everything");
    }

    let payload = encode_payload(&value)?;
    let generated = PacketGenerator::new(cli.kind, config.clone()).generate(&payload)?;
    info!(
        "session {}: {} packets for {} bytes",
        generated.session_id,
        generated.packets.len(),
        generated.byte_length
    );

    if let Some((mut store, exported)) = store {
        if let Some(collection) = as_scouting_collection(&exported) {
            record_export(&mut store, &collection)?;
        }
    }

    if let Some(out) = &cli.out {
        let mut file = File::create(out).await?;
        for packet in &generated.packets {
            file.write_all(packet.to_json()?.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        info!("wrote {} packets to {}", generated.packets.len(), out.display());
        return Ok(());
    }

    let mut carousel = PacketCarousel::new(&generated.packets, config.speed.interval())?;
    let total = carousel.len();
    carousel
        .run(cli.cycles, |position, frame| {
            println!("[{}/{}] {}", position + 1, total, frame);
        })
        .await;
    Ok(())
}

async fn receive(cli: &Cli, config: TransferConfig) -> Result<()> {
    let mut store = FileStore::open(&cli.store)?;
    let mut session = ImportSession::new(Scanner::with_config(cli.kind, &config), cli.merge);

    let progress = ProgressBar::new(0);
    progress.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} blocks {msg}")?);

    let mut lines = BufReader::new(open_input(cli.file.as_deref()).await?).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match session.scan(&line, &mut store) {
            Ok(ImportEvent::Progress(p)) | Ok(ImportEvent::Duplicate(p)) => {
                progress.set_length(p.estimated_needed as u64);
                progress.set_position(p.received as u64);
                progress.set_message(format!("{}% ({}/{} resolved)", p.percent, p.resolved, p.k));
            }
            Ok(ImportEvent::Imported(summary)) => {
                progress.finish_with_message("complete");
                println!("Imported into {}: {}", store.path().display(), summary);
                return Ok(());
            }
            Ok(ImportEvent::AlreadyComplete) => {}
            Err(fountainscout::import::ImportError::Scan(e)) => {
                progress.println(format!("skipped scan: {}", e));
            }
            Err(e) => {
                progress.abandon();
                return Err(e.into());
            }
        }
    }

    progress.abandon();
    let decoder = session.scanner().decoder();
    bail!(
        "input ended with {} of {} blocks resolved",
        decoder.resolved_count(),
        decoder.source_block_count().unwrap_or(0)
    )
}
