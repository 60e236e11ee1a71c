// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway metrics via the metrics-rs facade.

use metrics::{describe_counter, describe_gauge};

/// Register gateway metric descriptions. Called once after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("reprise_attach_total", "Stream attach attempts, by result");
    describe_gauge!("reprise_active_relays", "Open SSE relays");
    describe_counter!(
        "reprise_relay_resnapshots_total",
        "Relays that fell behind the channel and were re-snapshotted"
    );
    describe_counter!("reprise_relay_end_total", "Finished relays, by end reason");
}

pub fn record_attach(result: &'static str) {
    metrics::counter!("reprise_attach_total", "result" => result).increment(1);
}

pub fn relay_opened() {
    metrics::gauge!("reprise_active_relays").increment(1.0);
}

pub fn relay_closed() {
    metrics::gauge!("reprise_active_relays").decrement(1.0);
}

pub fn record_resnapshot() {
    metrics::counter!("reprise_relay_resnapshots_total").increment(1);
}

pub fn record_end(reason: &'static str) {
    metrics::counter!("reprise_relay_end_total", "reason" => reason).increment(1);
}
