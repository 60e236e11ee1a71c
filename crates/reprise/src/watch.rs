// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `reprise watch` command implementation.
//!
//! Follows a generation with the reconnecting client, feeds every update
//! into a [`StreamState`], and prints whatever the reveal scheduler has
//! uncovered on each tick. Thinking is printed dimmed ahead of the reply.

use std::io::{IsTerminal, Write};
use std::time::Duration;

use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use reprise_client::{GenerationClient, RevealScheduler, StreamState, Update};
use reprise_config::RepriseConfig;
use reprise_core::{MessageId, RepriseError};

/// Tracks how much of each buffer has already been written out.
#[derive(Debug, Default)]
struct Printer {
    thinking: usize,
    content: usize,
    color: bool,
}

impl Printer {
    fn new(color: bool) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// Text revealed since the last call.
    fn delta(&mut self, state: &StreamState) -> String {
        let mut out = String::new();

        let thinking = state.thinking().displayed();
        let shown = thinking.chars().count();
        if shown < self.thinking {
            // A snapshot replaced the text; start over on a fresh line.
            out.push('\n');
            self.thinking = 0;
        }
        let fresh: String = thinking.chars().skip(self.thinking).collect();
        if !fresh.is_empty() {
            if self.color {
                out.push_str(&fresh.dimmed().to_string());
            } else {
                out.push_str(&fresh);
            }
            self.thinking = shown;
        }

        let content = state.content().displayed();
        let shown = content.chars().count();
        if shown < self.content {
            out.push('\n');
            self.content = 0;
        }
        if self.content == 0 && shown > 0 && self.thinking > 0 {
            out.push_str("\n\n");
        }
        out.extend(content.chars().skip(self.content));
        self.content = shown;
        out
    }
}

/// One-line summary printed once the stream is over.
fn summary(state: &StreamState, color: bool) -> String {
    let line = if state.is_archived() {
        "archived: the reply is in the conversation history".to_string()
    } else if let Some(error) = state.error() {
        format!("error: {error}")
    } else if let Some(reason) = state.lost() {
        format!("lost: {reason}")
    } else {
        let stopped = state
            .metadata()
            .and_then(|m| m.get("stopped"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if stopped {
            "stopped".to_string()
        } else {
            state.status().to_string()
        }
    };
    if !color {
        return line;
    }
    if state.error().is_some() || state.lost().is_some() {
        line.red().to_string()
    } else {
        line.green().to_string()
    }
}

/// Run the `reprise watch` command.
pub async fn run_watch(
    config: &RepriseConfig,
    message_id: MessageId,
    plain: bool,
) -> Result<(), RepriseError> {
    let client = GenerationClient::from_config(&config.client)?;
    let scheduler = RevealScheduler::new(config.reveal.clone());
    let color = !plain && std::io::stdout().is_terminal();

    let (tx, mut rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    let reader = {
        let client = client.clone();
        let message_id = message_id.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { client.follow(&message_id, tx, cancel).await })
    };

    let mut state = StreamState::new(message_id);
    let mut printer = Printer::new(color);
    let mut stdout = std::io::stdout();
    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.reveal.tick_interval_ms.max(1)));
    let mut reading = true;

    loop {
        tokio::select! {
            update = rx.recv(), if reading => match update {
                Some(Update::Event(event)) => {
                    state.apply(event);
                }
                Some(Update::Archived) => state.mark_archived(),
                None => reading = false,
            },
            _ = ticker.tick() => {
                if !plain {
                    state.tick(&scheduler);
                    let out = printer.delta(&state);
                    if !out.is_empty() {
                        let _ = write!(stdout, "{out}");
                        let _ = stdout.flush();
                    }
                }
                if !reading {
                    break;
                }
            }
        }
    }
    cancel.cancel();

    let followed = match reader.await {
        Ok(result) => result,
        Err(e) => Err(RepriseError::Internal(format!("reader task failed: {e}"))),
    };
    if let Err(e) = &followed {
        state.mark_lost(e.to_string());
    }

    if plain {
        if !state.content().target().is_empty() {
            println!("{}", state.content().target());
        }
    } else {
        // Terminal events flush the buffers; print whatever is left.
        let out = printer.delta(&state);
        let _ = write!(stdout, "{out}");
        println!();
    }
    eprintln!("{}", summary(&state, color));
    followed
}
