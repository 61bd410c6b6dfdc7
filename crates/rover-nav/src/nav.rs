use rover_proto::telemetry::{EventKind, NavEvent};
use rover_vision::{debounce, TagConfig, TagDetector, TagId};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::actuator::{MotorActuator, MotorCommand};
use crate::decision::{DecisionParams, MovementDecision, DEFAULT_SHARP_TURN_DEG, DEFAULT_TOLERANCE_DEG};
use crate::doctor;
use crate::geo::{self, GeoPoint};
use crate::gnss::{Fix, PositionSource};
use crate::heading::HeadingSample;
use crate::mission::Mission;
use crate::signal::StopSignal;
use crate::NavError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Heading error still considered "straight ahead".
    pub tolerance_deg: f64,
    /// Heading error above which turns become sharp.
    pub sharp_turn_deg: f64,
    pub arrival_threshold_m: f64,
    pub read_timeout_ms: u64,
    /// Consecutive failed reads that abort the mission.
    pub max_fix_failures: u32,
    pub retry_backoff_ms: u64,
    pub cycle_delay_ms: u64,
    /// Standstill after reaching a waypoint.
    pub settle_ms: u64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            tolerance_deg: DEFAULT_TOLERANCE_DEG,
            sharp_turn_deg: DEFAULT_SHARP_TURN_DEG,
            arrival_threshold_m: 2.0,
            read_timeout_ms: 5_000,
            max_fix_failures: 5,
            retry_backoff_ms: 2_000,
            cycle_delay_ms: 500,
            settle_ms: 2_000,
        }
    }
}

impl NavConfig {
    pub fn decision_params(&self) -> DecisionParams {
        DecisionParams { tolerance_deg: self.tolerance_deg, sharp_turn_deg: self.sharp_turn_deg }
    }

    fn read_timeout(&self) -> Duration { Duration::from_millis(self.read_timeout_ms) }
    fn retry_backoff(&self) -> Duration { Duration::from_millis(self.retry_backoff_ms) }
    fn cycle_delay(&self) -> Duration { Duration::from_millis(self.cycle_delay_ms) }
    fn settle(&self) -> Duration { Duration::from_millis(self.settle_ms) }
}

/// Everything the loop remembers between cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationState {
    pub waypoint_index: usize,
    /// Last accepted fix; failed reads never touch it.
    pub previous_position: Option<GeoPoint>,
    pub consecutive_fix_failures: u32,
    pub tag_match_count: u32,
    pub last_tag: Option<TagId>,
    /// Last heading derived from real displacement, reused while standing still.
    pub last_heading: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavPhase {
    AwaitingFirstFix,
    Navigating,
    WaypointReached,
    Degraded,
    MissionComplete,
    Aborted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionOutcome {
    Completed { waypoints: usize },
    Aborted { fix_failures: u32, waypoint_index: usize },
    Cancelled { waypoint_index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub position: GeoPoint,
    pub waypoint_index: usize,
    pub distance_m: f64,
    pub bearing_deg: f64,
    pub heading_deg: Option<f64>,
    pub decision: MovementDecision,
    pub tag: Option<TagId>,
    pub reached: bool,
}

struct TagGate {
    detector: Box<dyn TagDetector>,
    threshold: u32,
    proximity_m: f64,
}

/// Waypoint follower. Owns the position source, the drive train and the optional
/// tag detector for the whole mission and releases them on every exit path.
pub struct Navigator<P: PositionSource, M: MotorActuator> {
    cfg: NavConfig,
    params: DecisionParams,
    mission: Mission,
    source: P,
    motor: M,
    tags: Option<TagGate>,
    stop: StopSignal,
    events: Option<mpsc::Sender<NavEvent>>,

    state: NavigationState,
    phase: NavPhase,
    last_command: Option<MotorCommand>,
    released: bool,
}

impl<P: PositionSource, M: MotorActuator> Navigator<P, M> {
    pub fn new(cfg: NavConfig, mission: Mission, source: P, motor: M, stop: StopSignal) -> Result<Self, NavError> {
        doctor::check_nav_config(&cfg)?;
        Ok(Self {
            params: cfg.decision_params(),
            cfg,
            mission,
            source,
            motor,
            tags: None,
            stop,
            events: None,
            state: NavigationState::default(),
            phase: NavPhase::AwaitingFirstFix,
            last_command: None,
            released: false,
        })
    }

    /// Gate waypoint arrival on a debounced marker reading instead of distance alone.
    pub fn with_tags(mut self, detector: Box<dyn TagDetector>, tags: &TagConfig) -> Result<Self, NavError> {
        doctor::check_tag_config(tags, &self.cfg)?;
        self.tags = Some(TagGate { detector, threshold: tags.threshold, proximity_m: tags.proximity_m });
        Ok(self)
    }

    /// Publish telemetry. Events are dropped rather than blocking when the receiver lags.
    pub fn with_events(mut self, tx: mpsc::Sender<NavEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> &NavigationState { &self.state }
    pub fn phase(&self) -> NavPhase { self.phase }

    /// Drive the mission to a terminal state. The rover is stopped and all
    /// collaborators are released before this returns.
    pub async fn run(mut self) -> MissionOutcome {
        info!(
            "mission: {} waypoints, marker confirmation {}",
            self.mission.len(),
            if self.tags.is_some() { "on" } else { "off" }
        );
        let outcome = self.drive().await;
        self.phase = match outcome {
            MissionOutcome::Completed { .. } => NavPhase::MissionComplete,
            MissionOutcome::Aborted { .. } => NavPhase::Aborted,
            MissionOutcome::Cancelled { .. } => NavPhase::Cancelled,
        };
        self.shutdown().await;

        let (kind, msg) = match outcome {
            MissionOutcome::Completed { waypoints } => {
                info!("mission complete: all {} waypoints reached", waypoints);
                (EventKind::Complete, format!("all {} waypoints reached", waypoints))
            }
            MissionOutcome::Aborted { fix_failures, waypoint_index } => {
                error!("mission aborted at waypoint {} after {} failed reads", waypoint_index + 1, fix_failures);
                (EventKind::Aborted, format!("{} consecutive failed reads", fix_failures))
            }
            MissionOutcome::Cancelled { waypoint_index } => {
                info!("mission cancelled at waypoint {}", waypoint_index + 1);
                (EventKind::Cancelled, "stopped by user".to_string())
            }
        };
        self.emit(self.event(kind, msg));
        outcome
    }

    async fn drive(&mut self) -> MissionOutcome {
        loop {
            if self.state.waypoint_index >= self.mission.len() {
                return MissionOutcome::Completed { waypoints: self.mission.len() };
            }
            if self.stop.is_stopped() {
                return self.cancelled();
            }

            let timeout = self.cfg.read_timeout();
            let read = tokio::select! {
                biased;
                _ = self.stop.stopped() => None,
                r = tokio::time::timeout(timeout, self.source.read()) => Some(r),
            };
            let Some(read) = read else { return self.cancelled() };

            let fix = match read {
                Ok(Ok(Fix::Position(p))) => Some(p),
                Ok(Ok(Fix::NoFix)) => None,
                Ok(Err(e)) => { warn!("position source error: {:#}", e); None }
                Err(_) => { warn!("no position within {}ms", self.cfg.read_timeout_ms); None }
            };

            let delay = match fix {
                Some(p) => self.on_fix(p),
                None => match self.on_fix_failure() {
                    Some(outcome) => return outcome,
                    None => self.cfg.retry_backoff(),
                },
            };
            // no settling once the last waypoint is behind us
            if self.state.waypoint_index >= self.mission.len() { continue; }
            if !self.pause(delay).await {
                return self.cancelled();
            }
        }
    }

    fn on_fix_failure(&mut self) -> Option<MissionOutcome> {
        self.state.consecutive_fix_failures += 1;
        let n = self.state.consecutive_fix_failures;
        let ceiling = self.cfg.max_fix_failures;
        warn!("position read failed ({}/{})", n, ceiling);

        self.ensure_stopped();
        if n >= ceiling {
            return Some(MissionOutcome::Aborted { fix_failures: n, waypoint_index: self.state.waypoint_index });
        }
        if self.phase != NavPhase::Degraded {
            warn!("degraded: holding position until fixes return");
        }
        self.phase = NavPhase::Degraded;
        self.emit(self.event(EventKind::Degraded, format!("no fix {}/{}", n, ceiling)));
        None
    }

    /// Handle one accepted fix; returns how long to wait before the next read.
    fn on_fix(&mut self, pos: GeoPoint) -> Duration {
        let failures = std::mem::take(&mut self.state.consecutive_fix_failures);
        if failures > 0 {
            info!("position recovered after {} failed reads", failures);
        }

        let Some(prev) = self.state.previous_position else {
            self.state.previous_position = Some(pos);
            self.phase = NavPhase::AwaitingFirstFix;
            info!("first fix {}, waiting for movement to estimate heading", pos);
            let mut ev = self.event(EventKind::AwaitingFix, "waiting for movement".into());
            ev.lat = Some(pos.lat());
            ev.lon = Some(pos.lon());
            self.emit(ev);
            return self.cfg.cycle_delay();
        };

        let report = self.navigate(prev, pos);
        let mut ev = self.event(EventKind::Cycle, String::new());
        ev.lat = Some(pos.lat());
        ev.lon = Some(pos.lon());
        ev.distance_m = Some(report.distance_m);
        ev.heading_deg = report.heading_deg;
        ev.bearing_deg = Some(report.bearing_deg);
        ev.decision = Some(report.decision.to_string());
        ev.tag = report.tag.map(|t| t.0);
        self.emit(ev);

        if report.reached {
            self.advance(&report);
            self.cfg.settle()
        } else {
            self.cfg.cycle_delay()
        }
    }

    fn navigate(&mut self, prev: GeoPoint, pos: GeoPoint) -> CycleReport {
        self.phase = NavPhase::Navigating;
        let index = self.state.waypoint_index;
        let target = self.mission.waypoints()[index].point;

        let distance_m = geo::distance(pos, target);
        let bearing_deg = geo::bearing(pos, target);
        if let Some(h) = HeadingSample::new(prev, pos).heading() {
            self.state.last_heading = Some(h);
        }
        let heading_deg = self.state.last_heading;
        let decision = match heading_deg {
            Some(h) => self.params.decide(h, bearing_deg),
            // never moved yet: roll forward to get a heading
            None => MovementDecision::Forward,
        };

        info!(
            "pos {} -> {} {:.2} m, heading {}, bearing {:.1}, {}",
            pos,
            target,
            distance_m,
            heading_deg.map(|h| format!("{:.1}", h)).unwrap_or_else(|| "-".into()),
            bearing_deg,
            decision.as_str().to_uppercase()
        );
        self.send(MotorCommand::Drive(decision));

        let (reached, tag) = self.check_arrival(distance_m);
        self.state.previous_position = Some(pos);

        CycleReport { position: pos, waypoint_index: index, distance_m, bearing_deg, heading_deg, decision, tag, reached }
    }

    fn check_arrival(&mut self, distance_m: f64) -> (bool, Option<TagId>) {
        let Some(gate) = self.tags.as_mut() else {
            return (distance_m < self.cfg.arrival_threshold_m, None);
        };
        if distance_m >= gate.proximity_m {
            return (false, None);
        }

        let reading = match gate.detector.read() {
            Ok(r) => r,
            Err(e) => { warn!("tag detector error: {:#}", e); None }
        };
        let threshold = gate.threshold;
        let (count, confirmed) = debounce::confirm(self.state.last_tag, reading, self.state.tag_match_count, threshold);
        self.state.tag_match_count = count;
        match reading {
            Some(t) => {
                self.state.last_tag = Some(t);
                debug!("tag {} seen ({}/{})", t, count, threshold);
                let mut ev = self.event(EventKind::TagSeen, format!("{}/{}", count, threshold));
                ev.tag = Some(t.0);
                self.emit(ev);
            }
            None => debug!("no tag in view near waypoint"),
        }
        if confirmed {
            info!("tag {} confirmed", self.state.last_tag.map(|t| t.to_string()).unwrap_or_default());
        }
        (confirmed, reading)
    }

    fn advance(&mut self, report: &CycleReport) {
        self.ensure_stopped();
        let name = self.mission.waypoints()[report.waypoint_index].name();
        info!(
            "reached waypoint {}/{} ({}) at {:.2} m",
            report.waypoint_index + 1,
            self.mission.len(),
            name,
            report.distance_m
        );

        let mut ev = self.event(EventKind::WaypointReached, name);
        ev.lat = Some(report.position.lat());
        ev.lon = Some(report.position.lon());
        ev.distance_m = Some(report.distance_m);
        ev.tag = report.tag.map(|t| t.0);
        self.emit(ev);

        self.state.waypoint_index += 1;
        self.state.tag_match_count = 0;
        self.state.last_tag = None;
        self.phase = NavPhase::WaypointReached;
    }

    fn cancelled(&mut self) -> MissionOutcome {
        self.ensure_stopped();
        MissionOutcome::Cancelled { waypoint_index: self.state.waypoint_index }
    }

    /// Sleep unless the stop signal fires first; false means stop.
    async fn pause(&mut self, d: Duration) -> bool {
        if d.is_zero() {
            return !self.stop.is_stopped();
        }
        tokio::select! {
            biased;
            _ = self.stop.stopped() => false,
            _ = tokio::time::sleep(d) => true,
        }
    }

    fn send(&mut self, cmd: MotorCommand) -> bool {
        match self.motor.command(cmd) {
            Ok(()) => {
                self.last_command = Some(cmd);
                true
            }
            Err(e) => {
                warn!("motor command {} failed: {:#}", cmd, e);
                false
            }
        }
    }

    /// Stop unless the last delivered command already was a stop.
    fn ensure_stopped(&mut self) {
        if self.last_command != Some(MotorCommand::Stop) {
            self.send(MotorCommand::Stop);
        }
    }

    async fn shutdown(&mut self) {
        self.ensure_stopped();
        if self.last_command != Some(MotorCommand::Stop) {
            error!("could not confirm the rover is stopped");
        }
        self.release_sync();
        if let Err(e) = self.source.release().await {
            warn!("position source release failed: {:#}", e);
        }
    }

    fn release_sync(&mut self) {
        if self.released { return; }
        self.released = true;
        if let Err(e) = self.motor.release() {
            warn!("motor release failed: {:#}", e);
        }
        if let Some(gate) = self.tags.as_mut() {
            if let Err(e) = gate.detector.release() {
                warn!("tag detector release failed: {:#}", e);
            }
        }
    }

    fn event(&self, kind: EventKind, msg: String) -> NavEvent {
        let ts_unix_ms = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let mut ev = NavEvent::new(ts_unix_ms, kind, self.state.waypoint_index, self.mission.len());
        ev.fix_failures = self.state.consecutive_fix_failures;
        ev.msg = msg;
        ev
    }

    fn emit(&self, ev: NavEvent) {
        if let Some(tx) = &self.events {
            if tx.try_send(ev).is_err() {
                debug!("telemetry receiver lagging, event dropped");
            }
        }
    }
}

impl<P: PositionSource, M: MotorActuator> Drop for Navigator<P, M> {
    // run() dropped mid-mission: at least leave the rover stopped
    fn drop(&mut self) {
        if !self.released {
            self.ensure_stopped();
            self.release_sync();
        }
    }
}
