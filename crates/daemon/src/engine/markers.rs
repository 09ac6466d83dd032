// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sentinel recognition over captured pane output.
//!
//! Pane text is untrusted: markers are found by regex scans, and a tail of
//! the previous capture is prepended so a marker cut at the top of the
//! capture window is still seen whole. Progress markers repeat across
//! ticks (the window barely moves in two seconds), so the scanner dedupes
//! on the raw marker text.

use crate::config::ProviderConfig;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Bytes of the previous capture carried into the next scan.
const OVERLAP_BYTES: usize = 512;

fn promise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(r"(?s)<promise>(.*?)</promise>") {
        Ok(re) => re,
        Err(_) => unreachable!("static promise regex"),
    })
}

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(r"(?s)<task-progress>(.*?)</task-progress>") {
        Ok(re) => re,
        Err(_) => unreachable!("static progress regex"),
    })
}

/// A parsed `<task-progress>` marker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgressMarker {
    pub phase: String,
    pub status: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// What one capture tick revealed, in the order the supervisor acts on it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// A completion sentinel was present.
    pub completed: bool,
    /// A progress marker not seen before.
    pub progress: Option<ProgressMarker>,
    /// A confirmation prompt is showing.
    pub confirm: bool,
    /// The provider's idle prompt shape is showing.
    pub idle_prompt: bool,
}

/// Provider patterns compiled once per agent loop.
pub struct CompiledProvider {
    idle: Vec<Regex>,
    confirm: Vec<Regex>,
}

impl CompiledProvider {
    /// Compile the provider's patterns, dropping ones that fail to parse
    /// (config is user input; a bad pattern should not kill the loop).
    pub fn compile(config: &ProviderConfig) -> Self {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p, error = %e, "ignoring bad provider pattern");
                        None
                    }
                })
                .collect::<Vec<Regex>>()
        };
        Self { idle: compile(&config.idle_prompt_patterns), confirm: compile(&config.confirm_patterns) }
    }
}

/// Per-agent scanner carrying the overlap buffer and dedupe state.
#[derive(Default)]
pub struct MarkerScanner {
    tail: String,
    last_progress_raw: Option<String>,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan one capture. Marker search runs over `tail + capture`, joined
    /// without a separator so a marker cut mid-token is reassembled; prompt
    /// shapes are only meaningful at the bottom of the live window, so they
    /// run over the capture alone.
    pub fn scan(&mut self, capture: &str, provider: &CompiledProvider) -> ScanOutcome {
        let mut joined = String::with_capacity(self.tail.len() + capture.len());
        joined.push_str(&self.tail);
        joined.push_str(capture);

        let mut outcome = ScanOutcome::default();

        for found in promise_re().captures_iter(&joined) {
            let inner = found.get(1).map(|m| m.as_str()).unwrap_or_default();
            if inner.to_uppercase().contains("DONE") {
                outcome.completed = true;
                break;
            }
        }

        // Last progress marker wins; identical repeats are the same sighting.
        if let Some(found) = progress_re().captures_iter(&joined).last() {
            let raw = found.get(1).map(|m| m.as_str()).unwrap_or_default().trim().to_string();
            if self.last_progress_raw.as_deref() != Some(raw.as_str()) {
                if let Ok(marker) = serde_json::from_str::<ProgressMarker>(&raw) {
                    self.last_progress_raw = Some(raw);
                    outcome.progress = Some(marker);
                } else {
                    tracing::debug!("ignoring malformed task-progress marker");
                }
            }
        }

        outcome.confirm = provider.confirm.iter().any(|re| re.is_match(capture));
        outcome.idle_prompt = provider.idle.iter().any(|re| re.is_match(capture));

        self.tail = tail_of(&joined);
        outcome
    }
}

/// The last `OVERLAP_BYTES` of text, cut on a char boundary.
fn tail_of(text: &str) -> String {
    if text.len() <= OVERLAP_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - OVERLAP_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
#[path = "markers_tests.rs"]
mod tests;
