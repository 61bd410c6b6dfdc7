use anyhow::{Context, Result};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::{TagDetector, TagId};

/// Plays back recorded detector output, one reading per line:
/// an integer tag id, or `-` / an empty line for "nothing seen".
/// Once exhausted every read reports nothing.
#[derive(Debug, Clone, Default)]
pub struct ReplayTagDetector {
    readings: VecDeque<Option<TagId>>,
}

impl ReplayTagDetector {
    pub fn from_readings(readings: impl IntoIterator<Item = Option<TagId>>) -> Self {
        Self { readings: readings.into_iter().collect() }
    }

    pub fn open(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("open tag replay {}", path))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut readings = VecDeque::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.starts_with('#') { continue; }
            if line.is_empty() || line == "-" {
                readings.push_back(None);
                continue;
            }
            match line.parse::<u32>() {
                Ok(id) => readings.push_back(Some(TagId(id))),
                Err(_) => warn!("tag replay line {}: not a tag id, skipped: {}", i + 1, line),
            }
        }
        Self { readings }
    }

    pub fn remaining(&self) -> usize {
        self.readings.len()
    }
}

impl TagDetector for ReplayTagDetector {
    fn read(&mut self) -> Result<Option<TagId>> {
        let r = self.readings.pop_front().flatten();
        debug!("tag replay: {:?}", r);
        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_ids_gaps_and_garbage() {
        let mut det = ReplayTagDetector::parse("# recorded run\n4\n-\n\n4\nx9\n5\n");
        assert_eq!(det.remaining(), 5);
        assert_eq!(det.read().unwrap(), Some(TagId(4)));
        assert_eq!(det.read().unwrap(), None);
        assert_eq!(det.read().unwrap(), None);
        assert_eq!(det.read().unwrap(), Some(TagId(4)));
        assert_eq!(det.read().unwrap(), Some(TagId(5)));
        // exhausted
        assert_eq!(det.read().unwrap(), None);
    }

    #[test]
    fn open_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "12\n12").unwrap();
        let mut det = ReplayTagDetector::open(f.path().to_str().unwrap()).unwrap();
        assert_eq!(det.read().unwrap(), Some(TagId(12)));
    }

    #[test]
    fn open_missing_file_fails() {
        assert!(ReplayTagDetector::open("/nonexistent/tags.txt").is_err());
    }
}
