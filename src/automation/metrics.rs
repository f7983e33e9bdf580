//! Persisted session metrics and the live metric board.
//!
//! stats.json holds two lifetime fields: the ITOPOD kill count and the idle
//! time those kills saved, as display text. It is read at startup (zeros when
//! missing) and written when a session ends.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::automation::progress::{ProgressEvent, ProgressValue, ITOPOD_SNIPES};

/// Lifetime statistics stored in stats.json.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub itopod_snipes: u64,
    pub itopod_time_saved: String,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self {
            itopod_snipes: 0,
            itopod_time_saved: format_time_saved(0.0),
        }
    }
}

impl SessionMetrics {
    /// Reads stats.json. A missing file yields zeros.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create stats directory")?;
        }
        let json = serde_json::to_string(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Counts one kill and refreshes the time-saved text.
    pub fn record_snipe(&mut self, seconds_per_kill: f64) {
        self.itopod_snipes += 1;
        self.itopod_time_saved = format_time_saved(self.itopod_snipes as f64 * seconds_per_kill);
    }
}

/// "1 days, 2 hours, 3 minutes, 4 seconds"
pub fn format_time_saved(total_secs: f64) -> String {
    let mut n = total_secs.max(0.0);
    let days = (n / 86_400.0).floor();
    n %= 86_400.0;
    let hours = (n / 3_600.0).floor();
    n %= 3_600.0;
    let minutes = (n / 60.0).floor();
    n %= 60.0;
    let seconds = n.floor();
    format!(
        "{} days, {} hours, {} minutes, {} seconds",
        days as u64, hours as u64, minutes as u64, seconds as u64
    )
}

/// Rounds to three significant digits and adds a K/M/B/T suffix.
///
/// `1_500_000.0` -> `"1.5M"`, `999.0` -> `"999"`.
pub fn human_format(value: f64) -> String {
    const SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];

    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let digits = 2 - value.abs().log10().floor() as i32;
    let mut num = if digits >= 0 {
        let factor = 10f64.powi(digits);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-digits);
        (value / factor).round() * factor
    };

    let mut magnitude = 0;
    while num.abs() >= 1000.0 && magnitude < SUFFIXES.len() - 1 {
        magnitude += 1;
        num /= 1000.0;
    }
    if num.abs() >= 1000.0 {
        return format!("{:.2e}", value);
    }

    let text = format!("{:.3}", num);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", text, SUFFIXES[magnitude])
}

/// Latest value of every metric, plus the persisted lifetime counters.
#[derive(Debug)]
pub struct MetricBoard {
    persisted: SessionMetrics,
    latest: BTreeMap<String, ProgressValue>,
    seconds_per_kill: f64,
}

impl MetricBoard {
    pub fn new(persisted: SessionMetrics, seconds_per_kill: f64) -> Self {
        Self {
            persisted,
            latest: BTreeMap::new(),
            seconds_per_kill,
        }
    }

    pub fn apply(&mut self, event: &ProgressEvent) {
        if event.metric == ITOPOD_SNIPES {
            self.persisted.record_snipe(self.seconds_per_kill);
        }
        self.latest.insert(event.metric.clone(), event.value.clone());
    }

    pub fn latest(&self, metric: &str) -> Option<&ProgressValue> {
        self.latest.get(metric)
    }

    pub fn persisted(&self) -> &SessionMetrics {
        &self.persisted
    }

    /// One-line summary for the log and tray tooltip.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .latest
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        parts.push(format!(
            "lifetime snipes: {}",
            human_format(self.persisted.itopod_snipes as f64)
        ));
        parts.join(", ")
    }
}
