// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tandem - client side of an event-sourced sync service.
//!
//! Local changes are recorded as events, queued durably in SQLite, and
//! delivered to a sync server either in batches over REST or over a
//! realtime WebSocket stream. Events from other nodes are pulled or pushed
//! back and applied to a local view in a deterministic causal order.
//!
//! # Main Components
//!
//! - [`auth::AuthManager`] - session lifecycle and token refresh
//! - [`sync::OfflineQueue`] - durable, ordered queue of local events
//! - [`sync::Uploader`] - batch push and cursor-based pull
//! - [`sync::RealtimeChannel`] - long-lived stream with heartbeat and reconnect
//! - [`sync::SyncEngine`] - the facade the commands drive
//!
//! ```rust,ignore
//! use tandem::commands::Context;
//!
//! let ctx = Context::load()?;
//! let engine = ctx.engine()?;
//! engine.record(EventType::FeatureCreated, "feat-1", json!({ "name": "Login" }))?;
//! let report = engine.sync_now().await?;
//! ```

pub mod api;
pub mod auth;
mod cli;
pub mod commands;
pub mod config;
pub mod env;
pub mod error;
pub mod store;
pub mod sync;
pub mod view;

#[cfg(test)]
mod test_helpers;

pub use cli::{AuthCommand, Cli, Command, EventCommand, OutputArgs, OutputFormat, SyncCommand};
pub use config::Config;
pub use error::{Error, Result};

use commands::Context;

/// Executes a CLI command on a fresh tokio runtime.
///
/// This is the entry point for the binary and a testable way to run
/// commands without spawning a process.
pub fn run(command: Command) -> Result<()> {
    let ctx = Context::load()?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(dispatch(&ctx, command))
}

async fn dispatch(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Auth(command) => commands::auth::run(ctx, command).await,
        Command::Sync(command) => commands::sync::run(ctx, command).await,
        Command::Event(command) => commands::event::run(ctx, command).await,
    }
}
