// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct OutputArgs {
    /// Output format
    #[arg(long = "output", short = 'o', value_enum, default_value = "text")]
    pub output: OutputFormat,
}

#[derive(Parser, Debug)]
#[command(name = "tandem")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline-first event sync client")]
#[command(
    long_about = "Offline-first event sync client.\n\n\
    Records changes locally, queues them durably, and delivers them to a sync \
    server in batches or over a realtime stream."
)]
pub struct Cli {
    /// Log debug detail to stderr (or TANDEM_LOG_FILE)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in, log out, and inspect the session
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Exchange events with the sync server
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Record and inspect local events
    #[command(subcommand)]
    Event(EventCommand),
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Log in to a sync server
    ///
    /// The password is read from TANDEM_PASSWORD if set, else from the
    /// first line of stdin.
    #[command(after_help = "\
Examples:
  tandem auth login -u ada --server https://sync.example.com
  echo \"$PW\" | tandem auth login -u ada
  tandem auth login -u ada --force     Replace the current session")]
    Login {
        /// Account name
        #[arg(long, short = 'u', value_parser = non_empty_string)]
        username: String,

        /// Server URL (defaults to server_url in config.toml)
        #[arg(long)]
        server: Option<String>,

        /// Replace an existing session
        #[arg(long)]
        force: bool,
    },

    /// Delete the stored session
    Logout,

    /// Show session state and expiry
    Status(OutputArgs),
}

#[derive(Subcommand, Debug)]
pub enum SyncCommand {
    /// Push queued events, then pull remote ones
    Now(OutputArgs),

    /// Upload queued events only
    Push(OutputArgs),

    /// Fetch remote events only
    Pull(OutputArgs),

    /// Show auth state, connectivity and queue depth
    Status(OutputArgs),

    /// Register aggregates to receive in real time
    #[command(after_help = "\
Examples:
  tandem sync workspace proj-1 wp-7 wp-9")]
    Workspace {
        /// Aggregate ids
        #[arg(required = true, value_parser = non_empty_string)]
        aggregate_ids: Vec<String>,
    },

    /// Keep a realtime connection open until interrupted
    Run,

    /// Re-arm events that failed permanently
    RetryFailed,
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Record a local change
    #[command(after_help = "\
Examples:
  tandem event record project-created proj-1 --payload '{\"name\":\"Apollo\"}'
  tandem event record work-package-moved wp-7")]
    Record {
        /// Event type, e.g. feature-updated
        event_type: String,

        /// Aggregate the event belongs to
        #[arg(value_parser = non_empty_string)]
        aggregate_id: String,

        /// JSON payload (defaults to {})
        #[arg(long, short = 'p')]
        payload: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show an aggregate's events in causal order
    History {
        #[arg(value_parser = non_empty_string)]
        aggregate_id: String,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
