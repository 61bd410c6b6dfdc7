use std::path::Path;
use tracing::{info, warn};

use crate::geo::{self, GeoPoint};
use crate::NavError;

#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    /// Zero-based position in the mission sequence.
    pub index: usize,
    pub point: GeoPoint,
    pub label: Option<String>,
}

impl Waypoint {
    pub fn name(&self) -> String {
        match &self.label {
            Some(l) => l.clone(),
            None => format!("wp{}", self.index + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    pub line_no: usize,
    pub content: String,
    pub reason: &'static str,
}

/// Point list grammar shared by mission and replay files:
/// `lat,lon[,label]` per line, `#` starts a comment line.
/// Anything else is reported back as skipped, never fatal.
pub fn parse_points(text: &str) -> (Vec<(GeoPoint, Option<String>)>, Vec<SkippedLine>) {
    let mut points = Vec::new();
    let mut skipped = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with('#') { continue; }

        let mut skip = |reason| skipped.push(SkippedLine { line_no: i + 1, content: line.to_string(), reason });
        if line.is_empty() { skip("blank line"); continue; }
        if !line.contains(',') { skip("missing comma"); continue; }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let (Ok(lat), Ok(lon)) = (parts[0].parse::<f64>(), parts[1].parse::<f64>()) else {
            skip("invalid number");
            continue;
        };
        let Ok(point) = GeoPoint::new(lat, lon) else {
            skip("coordinate out of range");
            continue;
        };
        let label = parts.get(2).filter(|s| !s.is_empty()).map(|s| s.to_string());
        points.push((point, label));
    }

    (points, skipped)
}

pub(crate) fn warn_skipped(origin: &str, skipped: &[SkippedLine]) {
    for s in skipped {
        warn!("{} line {}: {}, skipped: {:?}", origin, s.line_no, s.reason, s.content);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub from: usize,
    pub to: usize,
    pub distance_m: f64,
    pub bearing_deg: f64,
}

/// Ordered, non-empty waypoint sequence.
#[derive(Debug, Clone)]
pub struct Mission {
    waypoints: Vec<Waypoint>,
    skipped: usize,
}

impl Mission {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NavError> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| NavError::Io { path: origin.clone(), source })?;
        let m = Self::parse(&text, &origin)?;
        info!("loaded {} waypoints from {}", m.len(), origin);
        Ok(m)
    }

    pub fn parse(text: &str, origin: &str) -> Result<Self, NavError> {
        let (points, skipped) = parse_points(text);
        warn_skipped(origin, &skipped);
        if points.is_empty() {
            return Err(NavError::EmptyMission(origin.to_string()));
        }
        let waypoints = points
            .into_iter()
            .enumerate()
            .map(|(index, (point, label))| Waypoint { index, point, label })
            .collect();
        Ok(Self { waypoints, skipped: skipped.len() })
    }

    pub fn from_points(points: impl IntoIterator<Item = GeoPoint>) -> Result<Self, NavError> {
        let waypoints: Vec<Waypoint> = points
            .into_iter()
            .enumerate()
            .map(|(index, point)| Waypoint { index, point, label: None })
            .collect();
        if waypoints.is_empty() {
            return Err(NavError::EmptyMission("<inline>".into()));
        }
        Ok(Self { waypoints, skipped: 0 })
    }

    pub fn len(&self) -> usize { self.waypoints.len() }

    // never true once constructed, kept for clippy's len_without_is_empty
    pub fn is_empty(&self) -> bool { self.waypoints.is_empty() }

    pub fn get(&self, index: usize) -> Option<&Waypoint> { self.waypoints.get(index) }

    pub fn waypoints(&self) -> &[Waypoint] { &self.waypoints }

    /// Lines dropped while parsing.
    pub fn skipped_lines(&self) -> usize { self.skipped }

    pub fn legs(&self) -> Vec<Leg> {
        self.waypoints
            .windows(2)
            .map(|w| Leg {
                from: w[0].index,
                to: w[1].index,
                distance_m: geo::distance(w[0].point, w[1].point),
                bearing_deg: geo::bearing(w[0].point, w[1].point),
            })
            .collect()
    }

    pub fn total_length_m(&self) -> f64 {
        self.legs().iter().map(|l| l.distance_m).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl LogCapture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn skips_bad_line() {
        let m = Mission::parse("1.0,2.0\nbad-line\n3.0,4.0\n", "test").unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.skipped_lines(), 1);
        assert_eq!(m.get(1).unwrap().point, GeoPoint::new(3.0, 4.0).unwrap());
        assert_eq!(m.get(1).unwrap().index, 1);
    }

    #[test]
    fn bad_line_logs_one_warning() {
        let logs = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .without_time()
            .finish();
        let m = tracing::subscriber::with_default(subscriber, || Mission::parse("1.0,2.0\nbad-line\n3.0,4.0\n", "test").unwrap());

        assert_eq!(m.len(), 2);
        let out = logs.text();
        assert_eq!(out.lines().count(), 1, "{}", out);
        assert!(out.contains("WARN"));
        assert!(out.contains("line 2") && out.contains("bad-line"), "{}", out);
    }

    #[test]
    fn skip_reasons() {
        let (pts, skipped) = parse_points("# home field\n\n1.0,x\n95.0,1.0\nabc\n 52.5 , 13.25 , gate \n");
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].1.as_deref(), Some("gate"));
        let reasons: Vec<_> = skipped.iter().map(|s| (s.line_no, s.reason)).collect();
        assert_eq!(
            reasons,
            vec![(2, "blank line"), (3, "invalid number"), (4, "coordinate out of range"), (5, "missing comma")]
        );
    }

    #[test]
    fn empty_or_garbage_is_fatal() {
        assert!(matches!(Mission::parse("", "empty"), Err(NavError::EmptyMission(_))));
        assert!(matches!(Mission::parse("foo\nbar,baz\n", "junk"), Err(NavError::EmptyMission(_))));
        assert!(Mission::from_points(Vec::new()).is_err());
    }

    #[test]
    fn names_fall_back_to_ordinal() {
        let m = Mission::parse("1.0,2.0,dock\n3.0,4.0\n", "t").unwrap();
        assert_eq!(m.get(0).unwrap().name(), "dock");
        assert_eq!(m.get(1).unwrap().name(), "wp2");
    }

    #[test]
    fn legs_and_length() {
        let m = Mission::parse("0.0,0.0\n0.0,0.001\n0.001,0.001\n", "t").unwrap();
        let legs = m.legs();
        assert_eq!(legs.len(), 2);
        assert!((legs[0].bearing_deg - 90.0).abs() < 1e-6);
        assert!(legs[1].bearing_deg.abs() < 1e-6);
        assert!((m.total_length_m() - legs[0].distance_m - legs[1].distance_m).abs() < 1e-9);
        assert!((legs[0].distance_m - 111.19).abs() < 0.1);
    }

    #[test]
    fn load_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "52.4764387,13.4584166,one").unwrap();
        writeln!(f, "52.47639,13.45834,two").unwrap();
        let m = Mission::load(f.path()).unwrap();
        assert_eq!(m.len(), 2);
        assert!(matches!(Mission::load("/nonexistent/mission.txt"), Err(NavError::Io { .. })));
    }
}
