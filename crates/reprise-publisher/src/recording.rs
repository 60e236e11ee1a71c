// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer-side metrics via the metrics-rs facade.

use metrics::{describe_counter, describe_gauge};

/// Register producer metric descriptions. Called once after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "reprise_events_published_total",
        "Events persisted and published, by type"
    );
    describe_counter!(
        "reprise_generations_total",
        "Finished generations, by outcome"
    );
    describe_gauge!("reprise_active_generations", "Generations currently producing");
}

pub fn record_event(kind: &'static str) {
    metrics::counter!("reprise_events_published_total", "type" => kind).increment(1);
}

pub fn record_outcome(outcome: &'static str) {
    metrics::counter!("reprise_generations_total", "outcome" => outcome).increment(1);
}

pub fn set_active_generations(count: usize) {
    metrics::gauge!("reprise_active_generations").set(count as f64);
}
