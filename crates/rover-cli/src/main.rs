use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rover_nav::actuator::LogActuator;
use rover_nav::decision::heading_error;
use rover_nav::doctor as nav_doctor;
use rover_nav::gnss::{NmeaSource, PositionSource, ReplaySource};
use rover_nav::mission::Mission;
use rover_nav::nav::{MissionOutcome, NavConfig, Navigator};
use rover_nav::signal::StopSignal;
use rover_proto::telemetry::NavEvent;
use rover_vision::replay::ReplayTagDetector;
use rover_vision::{TagConfig, TagDetector};

use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "rover", version, about = "Rover - GNSS waypoint navigation")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate configuration and mission file.
    Doctor,
    /// Drive the mission until it completes, aborts or Ctrl-C.
    Run {
        /// Print telemetry as JSON lines on stdout.
        #[arg(long)]
        events: bool,
    },
    /// Print leg lengths and bearings of the mission.
    Plan,
    /// Show the movement decision for a heading/bearing pair.
    Decide {
        #[arg(allow_negative_numbers = true)]
        heading: f64,
        #[arg(allow_negative_numbers = true)]
        bearing: f64,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    mission: MissionCfg,
    gnss: GnssCfg,
    #[serde(default)]
    nav: NavConfig,
    tags: Option<TagConfig>,
    #[serde(default)]
    motor: MotorCfg,
}

#[derive(Debug, serde::Deserialize)]
struct MissionCfg { waypoints: String }

#[derive(Debug, serde::Deserialize)]
struct GnssCfg {
    source: String,
    nmea_device: Option<String>,
    #[serde(default = "default_baud")]
    baud: u32,
    nmea_file: Option<String>,
    replay_file: Option<String>,
}

fn default_baud() -> u32 { 9600 }

#[derive(Debug, serde::Deserialize)]
struct MotorCfg {
    driver: String,
}

impl Default for MotorCfg {
    fn default() -> Self { Self { driver: "log".into() } }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

fn load_mission(cfg: &Config) -> Result<Mission> {
    Mission::load(&cfg.mission.waypoints).with_context(|| format!("load mission {}", cfg.mission.waypoints))
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for reports and --events
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run { events } => run(&cfg, events).await?,
        Command::Plan => plan(&cfg)?,
        Command::Decide { heading, bearing } => decide(&cfg, heading, bearing)?,
    }
    Ok(())
}

fn check_gnss(g: &GnssCfg) -> Result<()> {
    match g.source.as_str() {
        "nmea-serial" => {
            anyhow::ensure!(g.nmea_device.as_ref().map(|s| !s.is_empty()).unwrap_or(false), "gnss.nmea_device missing");
            anyhow::ensure!(g.baud > 0, "gnss.baud invalid");
        }
        "nmea-file" => anyhow::ensure!(g.nmea_file.is_some(), "gnss.nmea_file missing"),
        "replay" => anyhow::ensure!(g.replay_file.is_some(), "gnss.replay_file missing"),
        other => anyhow::bail!("unknown gnss.source: {}", other),
    }
    Ok(())
}

fn check_tags(tags: &TagConfig, nav: &NavConfig) -> Result<()> {
    nav_doctor::check_tag_config(tags, nav)?;
    anyhow::ensure!(tags.source == "replay", "unknown tags.source: {}", tags.source);
    anyhow::ensure!(tags.replay_file.is_some(), "tags.replay_file missing");
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    nav_doctor::check_nav_config(&cfg.nav)?;
    check_gnss(&cfg.gnss)?;
    if let Some(t) = cfg.tags.as_ref().filter(|t| t.enable) {
        check_tags(t, &cfg.nav)?;
    }
    anyhow::ensure!(cfg.motor.driver == "log", "unknown motor.driver: {}", cfg.motor.driver);

    let mission = load_mission(cfg)?;
    for w in nav_doctor::mission_warnings(&mission, &cfg.nav) {
        warn!("doctor: {}", w);
    }

    println!("mission: {} waypoints, {:.1} m", mission.len(), mission.total_length_m());
    println!("gnss: {}", cfg.gnss.source);
    println!(
        "nav: tolerance={} sharp={} arrival={}m ceiling={}",
        cfg.nav.tolerance_deg, cfg.nav.sharp_turn_deg, cfg.nav.arrival_threshold_m, cfg.nav.max_fix_failures
    );
    match cfg.tags.as_ref().filter(|t| t.enable) {
        Some(t) => println!("tags: threshold={} proximity={}m", t.threshold, t.proximity_m),
        None => println!("tags: off"),
    }

    info!("doctor: OK");
    Ok(())
}

fn plan(cfg: &Config) -> Result<()> {
    let mission = load_mission(cfg)?;
    for w in mission.waypoints() {
        println!("{:>3} {} {}", w.index + 1, w.point, w.name());
    }
    for leg in mission.legs() {
        println!("leg {}->{}: {:.1} m, bearing {:.1}", leg.from + 1, leg.to + 1, leg.distance_m, leg.bearing_deg);
    }
    println!("total: {:.1} m", mission.total_length_m());
    Ok(())
}

fn decide(cfg: &Config, heading: f64, bearing: f64) -> Result<()> {
    nav_doctor::check_nav_config(&cfg.nav)?;
    anyhow::ensure!(heading.is_finite() && bearing.is_finite(), "heading and bearing must be finite");
    let d = cfg.nav.decision_params().decide(heading, bearing);
    println!("{} (error {:+.1} deg)", d, heading_error(heading, bearing));
    Ok(())
}

fn init_tags(cfg: &Config) -> Result<Option<(Box<dyn TagDetector>, &TagConfig)>> {
    let Some(t) = &cfg.tags else { return Ok(None); };
    if !t.enable { return Ok(None); }

    let det: Box<dyn TagDetector> = match t.source.as_str() {
        "replay" => Box::new(ReplayTagDetector::open(t.replay_file.as_deref().context("tags.replay_file missing")?)?),
        other => anyhow::bail!("unknown tags.source: {}", other),
    };
    Ok(Some((det, t)))
}

async fn run(cfg: &Config, events: bool) -> Result<()> {
    info!("run: starting");
    anyhow::ensure!(cfg.motor.driver == "log", "unknown motor.driver: {}", cfg.motor.driver);
    let mission = load_mission(cfg)?;

    let (handle, stop) = StopSignal::new();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c: stopping rover");
                handle.stop();
            }
            Err(e) => warn!("ctrl-c handler unavailable: {:#}", e),
        }
    });

    let (tx, printer) = if events {
        let (tx, mut rx) = mpsc::channel::<NavEvent>(64);
        let printer = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                match serde_json::to_string(&ev) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("event encode failed: {:#}", e),
                }
            }
        });
        (Some(tx), Some(printer))
    } else {
        (None, None)
    };

    let outcome = match cfg.gnss.source.as_str() {
        "nmea-serial" => {
            let dev = cfg.gnss.nmea_device.as_ref().context("gnss.nmea_device missing")?;
            drive(cfg, mission, NmeaSource::serial(dev, cfg.gnss.baud)?, stop, tx).await?
        }
        "nmea-file" => {
            let path = cfg.gnss.nmea_file.as_ref().context("gnss.nmea_file missing")?;
            drive(cfg, mission, NmeaSource::file(path)?, stop, tx).await?
        }
        "replay" => {
            let path = cfg.gnss.replay_file.as_ref().context("gnss.replay_file missing")?;
            drive(cfg, mission, ReplaySource::open(path)?, stop, tx).await?
        }
        other => anyhow::bail!("unknown gnss.source: {}", other),
    };

    // sender went away with the navigator, so the printer drains and exits
    if let Some(h) = printer {
        finish_printer(h).await;
    }

    match outcome {
        MissionOutcome::Completed { waypoints } => info!("run: all {} waypoints reached", waypoints),
        MissionOutcome::Cancelled { waypoint_index } => info!("run: cancelled before waypoint {}", waypoint_index + 1),
        MissionOutcome::Aborted { fix_failures, waypoint_index } => anyhow::bail!(
            "mission aborted before waypoint {} after {} failed position reads",
            waypoint_index + 1,
            fix_failures
        ),
    }
    Ok(())
}

async fn finish_printer(h: tokio::task::JoinHandle<()>) {
    if let Err(e) = h.await {
        warn!("event printer failed: {}", e);
    }
}

async fn drive<P: PositionSource>(
    cfg: &Config,
    mission: Mission,
    src: P,
    stop: StopSignal,
    events: Option<mpsc::Sender<NavEvent>>,
) -> Result<MissionOutcome> {
    let mut nav = Navigator::new(cfg.nav.clone(), mission, src, LogActuator::new(), stop)?;
    if let Some((det, tags)) = init_tags(cfg)? {
        nav = nav.with_tags(det, tags)?;
    }
    if let Some(tx) = events {
        nav = nav.with_events(tx);
    }
    Ok(nav.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[mission]
waypoints = "mission.csv"

[gnss]
source = "replay"
replay_file = "track.csv"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.gnss.baud, 9600);
        assert_eq!(cfg.motor.driver, "log");
        assert_eq!(cfg.nav.max_fix_failures, 5);
        assert_eq!(cfg.nav.arrival_threshold_m, 2.0);
        assert!(cfg.tags.is_none());
        check_gnss(&cfg.gnss).unwrap();
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let text = format!("{}\n[nav]\ntolerance_deg = 15.0\n\n[tags]\nenable = true\nreplay_file = \"tags.txt\"\n", MINIMAL);
        let cfg: Config = toml::from_str(&text).unwrap();
        assert_eq!(cfg.nav.tolerance_deg, 15.0);
        assert_eq!(cfg.nav.sharp_turn_deg, 45.0);
        let tags = cfg.tags.unwrap();
        assert_eq!(tags.threshold, 3);
        check_tags(&tags, &cfg.nav).unwrap();
    }

    #[test]
    fn gnss_source_needs_its_input() {
        let g = GnssCfg { source: "nmea-serial".into(), nmea_device: None, baud: 9600, nmea_file: None, replay_file: None };
        assert!(check_gnss(&g).is_err());
        let g = GnssCfg { source: "carrier-pigeon".into(), ..g };
        assert!(check_gnss(&g).is_err());
    }

    #[tokio::test]
    async fn printer_panic_is_absorbed() {
        let h = tokio::spawn(async { panic!("stdout closed") });
        finish_printer(h).await;
        finish_printer(tokio::spawn(async {})).await;
    }

    #[test]
    fn loads_config_and_mission_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mission = dir.path().join("mission.csv");
        std::fs::write(&mission, "# survey\n52.0,21.0,gate\n52.001,21.0\n").unwrap();
        let cfg_path = dir.path().join("rover.toml");
        std::fs::write(
            &cfg_path,
            format!("[mission]\nwaypoints = {:?}\n\n[gnss]\nsource = \"replay\"\nreplay_file = \"x\"\n", mission.display().to_string()),
        )
        .unwrap();

        let cfg = load_config(cfg_path.to_str().unwrap()).unwrap();
        let m = load_mission(&cfg).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.waypoints()[0].name(), "gate");
        doctor(&cfg).unwrap();
    }
}
