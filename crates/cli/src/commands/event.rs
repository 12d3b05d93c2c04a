// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `tandem event` commands.

use serde_json::Value;
use tandem_core::{Event, EventType};

use super::{print, Context};
use crate::cli::EventCommand;
use crate::error::{Error, Result};

pub async fn run(ctx: &Context, command: EventCommand) -> Result<()> {
    match command {
        EventCommand::Record {
            event_type,
            aggregate_id,
            payload,
            output,
        } => {
            let event_type: EventType = event_type.parse()?;
            let payload = parse_payload(payload.as_deref())?;
            let event = ctx.engine()?.record(event_type, &aggregate_id, payload)?;
            print(output.output, &event, |e| {
                format!("Recorded {} (lamport {})", e.event_id, e.lamport_clock)
            })
        }
        EventCommand::History {
            aggregate_id,
            output,
        } => {
            let view = ctx.engine()?.history(&aggregate_id)?;
            print(output.output, &view.events(), |events| render_history(events))
        }
    }
}

/// Parses the `--payload` argument. A missing payload is an empty object.
pub(crate) fn parse_payload(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };
    serde_json::from_str(raw)
        .map_err(|e| Error::InvalidInput(format!("payload is not valid JSON: {e}")))
}

pub(crate) fn render_history(events: &[Event]) -> String {
    if events.is_empty() {
        return "No events".to_string();
    }
    events
        .iter()
        .map(|e| {
            format!(
                "{:>4}  {:<12} {:<22} {}  {}",
                e.lamport_clock,
                e.node_id,
                e.event_type.as_str(),
                e.event_id,
                e.payload
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
