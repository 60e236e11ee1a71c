// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `reprise status` command implementation.

use std::io::IsTerminal;

use colored::Colorize;
use serde::Serialize;

use reprise_client::GenerationClient;
use reprise_config::RepriseConfig;
use reprise_core::{MessageId, RepriseError, StatusView};

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
struct StatusOutput {
    message_id: MessageId,
    /// `false` once the record has been reclaimed.
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<StatusView>,
}

fn render(output: &StatusOutput, color: bool) -> String {
    let Some(status) = &output.status else {
        let line = format!("{}: not found (archived or unknown)", output.message_id);
        return if color { line.yellow().to_string() } else { line };
    };
    let state = if status.active { "running" } else { "finished" };
    let run = status
        .run_id
        .as_ref()
        .map(|id| format!(" run={id}"))
        .unwrap_or_default();
    let line = format!("{}: {state} ({}){run}", output.message_id, status.status);
    if !color {
        line
    } else if status.active {
        line.cyan().to_string()
    } else {
        line.green().to_string()
    }
}

/// Run the `reprise status` command.
pub async fn run_status(
    config: &RepriseConfig,
    message_id: MessageId,
    json: bool,
) -> Result<(), RepriseError> {
    let client = GenerationClient::from_config(&config.client)?;
    let status = match client.get_status(&message_id).await {
        Ok(status) => Some(status),
        Err(RepriseError::NotFound { .. }) => None,
        Err(e) => return Err(e),
    };
    let output = StatusOutput {
        message_id,
        found: status.is_some(),
        status,
    };

    if json {
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| RepriseError::Internal(format!("failed to render status: {e}")))?;
        println!("{text}");
    } else {
        println!("{}", render(&output, std::io::stdout().is_terminal()));
    }
    Ok(())
}
