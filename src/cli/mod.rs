//! Output and argument helpers shared by the `sentinel` command paths.
#![allow(missing_docs)]

use std::io::{self, Write};
use std::time::Duration;

use colored::{ColoredString, Colorize};
use serde_json::Value;

use crate::cardgame::Faults;
use crate::invariants::Severity;

/// Default per-fault firing chance when `--faults` is given without a rate.
pub const DEFAULT_FAULT_RATE: f64 = 0.05;

/// Fault names accepted by `--faults`.
pub const FAULT_NAMES: &[&str] = &[
    "leave-dead-minions",
    "skip-turns",
    "free-spells",
    "ignore-hand-limit",
    "stunned-attack",
    "reuse-entity-ids",
    "overheal",
    "lose-spent-spells",
];

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Pick the output mode from the `--json` flag, `SENTINEL_OUTPUT_FORMAT`
/// and whether stdout is a terminal.
pub fn resolve_output_mode(
    json_flag: bool,
    env_mode: Option<&str>,
    stdout_is_tty: bool,
) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

pub fn write_json_line(payload: &Value) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

/// Parse a comma-separated fault list (`all` enables every fault).
pub fn parse_faults(names: &[String], rate: Option<f64>) -> Result<Faults, String> {
    let rate = rate.unwrap_or(if names.is_empty() { 0.0 } else { DEFAULT_FAULT_RATE });
    if !(0.0..=1.0).contains(&rate) {
        return Err(format!("fault rate must be within [0, 1], got {rate}"));
    }

    let mut faults = Faults {
        rate,
        ..Faults::default()
    };
    for raw in names {
        match raw.trim() {
            "all" => faults = Faults::all(rate),
            "leave-dead-minions" => faults.leave_dead_minions = true,
            "skip-turns" => faults.skip_turns = true,
            "free-spells" => faults.free_spells = true,
            "ignore-hand-limit" => faults.ignore_hand_limit = true,
            "stunned-attack" => faults.stunned_attack = true,
            "reuse-entity-ids" => faults.reuse_entity_ids = true,
            "overheal" => faults.overheal = true,
            "lose-spent-spells" => faults.lose_spent_spells = true,
            "" => {}
            other => {
                return Err(format!(
                    "unknown fault {other:?} (expected one of: all, {})",
                    FAULT_NAMES.join(", ")
                ));
            }
        }
    }
    Ok(faults)
}

pub fn paint_severity(severity: Severity) -> ColoredString {
    let label = severity.as_str();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.dimmed(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_wins_over_env_and_tty() {
        assert_eq!(resolve_output_mode(true, Some("human"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("json"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some(" Human "), false), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, Some("bogus"), false), OutputMode::Json);
    }

    #[test]
    fn faults_parse_names_and_rates() {
        let none = parse_faults(&[], None).unwrap();
        assert_eq!(none, Faults::default());

        let some = parse_faults(&["skip-turns".to_string(), "overheal".to_string()], None).unwrap();
        assert!(some.skip_turns && some.overheal);
        assert!(!some.free_spells);
        assert!((some.rate - DEFAULT_FAULT_RATE).abs() < f64::EPSILON);

        let all = parse_faults(&["all".to_string()], Some(0.5)).unwrap();
        assert_eq!(all, Faults::all(0.5));

        assert!(parse_faults(&["teleport".to_string()], None).is_err());
        assert!(parse_faults(&["all".to_string()], Some(1.5)).is_err());
    }

    #[test]
    fn durations_and_truncation_render_compactly() {
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 05s");
        assert_eq!(format_duration(Duration::from_secs(7_260)), "2h 01m");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
