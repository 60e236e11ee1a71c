// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Progressive reveal of streamed text.
//!
//! A [`RevealBuffer`] holds the full received text (`target`) and how many
//! characters of it are on screen. The [`RevealScheduler`] advances buffers
//! one tick at a time, speeding up when the backlog grows so the display
//! never falls far behind the producer. Everything here is pure and driven by
//! explicit ticks.

use reprise_config::model::RevealConfig;

/// Received text plus a display cursor, counted in characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealBuffer {
    target: String,
    target_chars: usize,
    displayed_len: usize,
}

impl RevealBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the target. The display cursor is untouched.
    pub fn push(&mut self, text: &str) {
        self.target.push_str(text);
        self.target_chars += text.chars().count();
    }

    /// Swap in a new target.
    ///
    /// The cursor survives when the new target starts with what is already
    /// on screen, otherwise it restarts from zero.
    pub fn replace(&mut self, text: String) {
        if !text.starts_with(self.displayed()) {
            self.displayed_len = 0;
        }
        self.target_chars = text.chars().count();
        self.target = text;
        self.displayed_len = self.displayed_len.min(self.target_chars);
    }

    /// Reveal everything at once.
    pub fn flush(&mut self) {
        self.displayed_len = self.target_chars;
    }

    /// Move the cursor forward by at most `n` characters. Returns how far it moved.
    pub fn advance(&mut self, n: usize) -> usize {
        let step = n.min(self.backlog());
        self.displayed_len += step;
        step
    }

    /// Characters received but not yet revealed.
    pub fn backlog(&self) -> usize {
        self.target_chars - self.displayed_len
    }

    pub fn is_caught_up(&self) -> bool {
        self.displayed_len == self.target_chars
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed_len
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// The revealed prefix of the target.
    pub fn displayed(&self) -> &str {
        let end = self
            .target
            .char_indices()
            .nth(self.displayed_len)
            .map(|(i, _)| i)
            .unwrap_or(self.target.len());
        &self.target[..end]
    }
}

/// Tick-driven pacing for reveal buffers.
#[derive(Debug, Clone)]
pub struct RevealScheduler {
    config: RevealConfig,
}

impl RevealScheduler {
    pub fn new(config: RevealConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RevealConfig {
        &self.config
    }

    /// Characters to reveal this tick for a given backlog.
    pub fn step(&self, backlog: usize) -> usize {
        if backlog == 0 {
            return 0;
        }
        let base = self.config.chars_per_tick.max(1);
        let rate = if backlog > self.config.catch_up_threshold {
            base.max(backlog / self.config.catch_up_divisor.max(1))
        } else {
            base
        };
        rate.min(self.config.max_chars_per_tick.max(base)).min(backlog)
    }

    /// Advance one buffer by one tick. Returns whether anything was revealed.
    pub fn tick(&self, buffer: &mut RevealBuffer) -> bool {
        let step = self.step(buffer.backlog());
        buffer.advance(step) > 0
    }
}

impl Default for RevealScheduler {
    fn default() -> Self {
        Self::new(RevealConfig::default())
    }
}
