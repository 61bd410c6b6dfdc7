use rover_vision::TagConfig;

use crate::geo;
use crate::mission::Mission;
use crate::nav::NavConfig;
use crate::NavError;

fn ensure(ok: bool, msg: &str) -> Result<(), NavError> {
    if ok { Ok(()) } else { Err(NavError::InvalidConfig(msg.to_string())) }
}

pub fn check_nav_config(cfg: &NavConfig) -> Result<(), NavError> {
    ensure(cfg.tolerance_deg > 0.0 && cfg.tolerance_deg < 180.0, "nav.tolerance_deg must be in (0, 180)")?;
    ensure(
        cfg.sharp_turn_deg >= cfg.tolerance_deg && cfg.sharp_turn_deg <= 180.0,
        "nav.sharp_turn_deg must be in [tolerance_deg, 180]",
    )?;
    ensure(cfg.arrival_threshold_m > 0.0 && cfg.arrival_threshold_m.is_finite(), "nav.arrival_threshold_m must be positive")?;
    ensure(cfg.read_timeout_ms > 0, "nav.read_timeout_ms must be positive")?;
    ensure(cfg.max_fix_failures >= 1, "nav.max_fix_failures must be at least 1")?;
    Ok(())
}

pub fn check_tag_config(tags: &TagConfig, nav: &NavConfig) -> Result<(), NavError> {
    ensure(tags.threshold >= 1, "tags.threshold must be at least 1")?;
    ensure(tags.proximity_m.is_finite(), "tags.proximity_m must be finite")?;
    ensure(
        tags.proximity_m >= nav.arrival_threshold_m,
        "tags.proximity_m must not be smaller than nav.arrival_threshold_m",
    )?;
    Ok(())
}

/// Non-fatal observations about a mission, for the operator.
pub fn mission_warnings(mission: &Mission, nav: &NavConfig) -> Vec<String> {
    let mut out = Vec::new();
    if mission.skipped_lines() > 0 {
        out.push(format!("{} malformed lines were skipped", mission.skipped_lines()));
    }
    for leg in mission.legs() {
        if leg.distance_m < nav.arrival_threshold_m {
            out.push(format!(
                "waypoints {} and {} are {:.2} m apart, closer than the arrival threshold",
                leg.from + 1, leg.to + 1, leg.distance_m
            ));
        }
    }
    if let (Some(first), Some(last)) = (mission.waypoints().first(), mission.waypoints().last()) {
        if mission.len() > 2 && geo::distance(first.point, last.point) < nav.arrival_threshold_m {
            out.push("mission ends where it starts (loop)".to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass() {
        check_nav_config(&NavConfig::default()).unwrap();
        check_tag_config(&TagConfig::default(), &NavConfig::default()).unwrap();
    }

    #[test]
    fn rejects_bad_tuning() {
        let bad = [
            NavConfig { tolerance_deg: 0.0, ..NavConfig::default() },
            NavConfig { tolerance_deg: f64::NAN, ..NavConfig::default() },
            NavConfig { tolerance_deg: 50.0, ..NavConfig::default() },
            NavConfig { arrival_threshold_m: -1.0, ..NavConfig::default() },
            NavConfig { max_fix_failures: 0, ..NavConfig::default() },
            NavConfig { read_timeout_ms: 0, ..NavConfig::default() },
        ];
        for cfg in bad {
            assert!(matches!(check_nav_config(&cfg), Err(NavError::InvalidConfig(_))), "{:?}", cfg);
        }
    }

    #[test]
    fn tag_checks() {
        let nav = NavConfig::default();
        assert!(check_tag_config(&TagConfig { threshold: 0, ..TagConfig::default() }, &nav).is_err());
        assert!(check_tag_config(&TagConfig { proximity_m: 1.0, ..TagConfig::default() }, &nav).is_err());
    }

    #[test]
    fn warns_about_short_legs() {
        let m = Mission::parse("0.0,0.0\n0.0,0.000001\n0.0,0.001\nbroken\n", "t").unwrap();
        let w = mission_warnings(&m, &NavConfig::default());
        assert_eq!(w.len(), 2);
        assert!(w[1].contains("waypoints 1 and 2"));
    }
}
