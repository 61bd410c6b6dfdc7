use anyhow::{Context, Result};
use std::collections::VecDeque;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::geo::GeoPoint;
use crate::mission::{parse_points, warn_skipped};

/// Result of one position request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fix {
    Position(GeoPoint),
    NoFix,
}

/// Anything the navigator can pull positions from. The navigator bounds each
/// `read` with its own timeout, so implementations may wait for the next fix.
#[allow(async_fn_in_trait)]
pub trait PositionSource {
    async fn read(&mut self) -> Result<Fix>;

    async fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

pub enum NmeaSource {
    Serial(BufReader<SerialStream>),
    File(BufReader<File>),
}

impl NmeaSource {
    pub fn serial(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud).open_native_async()
            .with_context(|| format!("open serial {} @ {}", dev, baud))?;
        info!("gnss: reading NMEA from {} @ {}", dev, baud);
        Ok(Self::Serial(BufReader::new(port)))
    }

    pub fn file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path).with_context(|| format!("open nmea file {}", path))?;
        info!("gnss: replaying NMEA from {}", path);
        Ok(Self::File(BufReader::new(File::from_std(f))))
    }
}

impl PositionSource for NmeaSource {
    async fn read(&mut self) -> Result<Fix> {
        loop {
            let p = match self {
                NmeaSource::Serial(r) => {
                    let line = next_line(r).await.context("read serial")?.context("serial port closed")?;
                    let Some(p) = parse_nmea_line(line.trim()) else { continue };
                    // the receiver keeps talking between cycles; steer on the latest epoch
                    newest_buffered(r, p).await.context("read serial")?
                }
                NmeaSource::File(r) => {
                    let Some(line) = next_line(r).await.context("read nmea file")? else {
                        // EOF: the log may still be growing
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                        continue;
                    };
                    match parse_nmea_line(line.trim()) {
                        Some(p) => p,
                        None => continue,
                    }
                }
            };
            return Ok(Fix::Position(p));
        }
    }
}

/// Next line, decoded lossily so line noise never fails the read. `None` at EOF.
async fn next_line<R: AsyncBufRead + Unpin>(r: &mut R) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    if r.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Decode the complete lines already sitting in the read buffer, without waiting
/// for more input, and keep the newest fix among them.
async fn newest_buffered<R: AsyncRead + Unpin>(r: &mut BufReader<R>, mut latest: GeoPoint) -> std::io::Result<GeoPoint> {
    let mut dropped = 0;
    while r.buffer().contains(&b'\n') {
        let Some(line) = next_line(r).await? else { break };
        if let Some(p) = parse_nmea_line(line.trim()) {
            latest = p;
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!("nmea: skipped {} stale fixes", dropped);
    }
    Ok(latest)
}

/// Decode a GGA or RMC sentence into a position.
/// Sentences without a valid fix, with a bad checksum, or of other types yield `None`.
pub fn parse_nmea_line(s: &str) -> Option<GeoPoint> {
    let parts = split_sentence(s)?;
    let kind = parts[0];
    if kind.len() != 5 || !(kind.starts_with("GP") || kind.starts_with("GN")) {
        return None;
    }

    // GGA: 2=lat 3=N/S 4=lon 5=E/W 6=quality
    // RMC: 2=status 3=lat 4=N/S 5=lon 6=E/W
    let (lat, lon) = match &kind[2..] {
        "GGA" if parts.len() > 6 => {
            if parts[6].is_empty() || parts[6] == "0" { return None; }
            (parse_deg_min(parts[2], parts[3])?, parse_deg_min(parts[4], parts[5])?)
        }
        "RMC" if parts.len() > 6 => {
            if parts[2] != "A" { return None; }
            (parse_deg_min(parts[3], parts[4])?, parse_deg_min(parts[5], parts[6])?)
        }
        _ => return None,
    };

    match GeoPoint::new(lat, lon) {
        Ok(p) => Some(p),
        Err(e) => { debug!("nmea: {}", e); None }
    }
}

fn split_sentence(s: &str) -> Option<Vec<&str>> {
    let s = s.strip_prefix('$')?;
    let body = match s.split_once('*') {
        Some((body, sum)) => {
            let want = u8::from_str_radix(sum.trim(), 16).ok()?;
            let got = body.bytes().fold(0u8, |acc, b| acc ^ b);
            if want != got {
                debug!("nmea: checksum mismatch (want {:02X}, got {:02X})", want, got);
                return None;
            }
            body
        }
        None => s,
    };
    Some(body.split(',').collect())
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() { return None; }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.').unwrap_or(v.len());
    let deg_len = if dot > 4 { 3 } else { 2 };
    let deg: f64 = v.get(..deg_len)?.parse().ok()?;
    let min: f64 = v.get(deg_len..)?.parse().ok()?;
    if !(0.0..60.0).contains(&min) { return None; }
    let out = deg + min / 60.0;
    match hemi {
        "N" | "E" => Some(out),
        "S" | "W" => Some(-out),
        _ => None,
    }
}

/// Plays back recorded fixes in order. Once the recording is exhausted
/// every read reports `NoFix`.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    fixes: VecDeque<Fix>,
}

impl ReplaySource {
    /// `lat,lon` per line, same grammar as mission files.
    pub fn open(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("open replay file {}", path))?;
        let (points, skipped) = parse_points(&text);
        warn_skipped(path, &skipped);
        anyhow::ensure!(!points.is_empty(), "replay file {} has no usable positions", path);
        info!("gnss: replaying {} positions from {}", points.len(), path);
        Ok(Self::from_points(points.into_iter().map(|(p, _)| p)))
    }

    pub fn from_points(points: impl IntoIterator<Item = GeoPoint>) -> Self {
        Self::from_fixes(points.into_iter().map(Fix::Position))
    }

    pub fn from_fixes(fixes: impl IntoIterator<Item = Fix>) -> Self {
        Self { fixes: fixes.into_iter().collect() }
    }

    pub fn remaining(&self) -> usize {
        self.fixes.len()
    }
}

impl PositionSource for ReplaySource {
    async fn read(&mut self) -> Result<Fix> {
        Ok(self.fixes.pop_front().unwrap_or(Fix::NoFix))
    }
}
