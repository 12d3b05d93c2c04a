// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `tandem sync` commands.

use tokio_util::sync::CancellationToken;

use super::{print, Context};
use crate::cli::SyncCommand;
use crate::error::Result;
use crate::sync::{PullReport, PushReport, SyncReport, SyncStatus, WebSocketTransport};

pub async fn run(ctx: &Context, command: SyncCommand) -> Result<()> {
    match command {
        SyncCommand::Now(args) => {
            let report = ctx.engine()?.sync_now().await?;
            print(args.output, &report, render_sync)
        }
        SyncCommand::Push(args) => {
            let report = ctx.engine()?.push().await?;
            print(args.output, &report, render_push)
        }
        SyncCommand::Pull(args) => {
            let report = ctx.engine()?.pull().await?;
            print(args.output, &report, render_pull)
        }
        SyncCommand::Status(args) => {
            let status = ctx.engine()?.sync_status()?;
            print(args.output, &status, render_status)
        }
        SyncCommand::Workspace { aggregate_ids } => {
            let registered = ctx
                .engine()?
                .register_workspace(&aggregate_ids, WebSocketTransport::new())
                .await?;
            println!("Registered: {}", registered.join(", "));
            Ok(())
        }
        SyncCommand::Run => run_realtime(ctx).await,
        SyncCommand::RetryFailed => {
            let rearmed = ctx.engine()?.retry_failed()?;
            println!("Re-armed {rearmed} event(s)");
            Ok(())
        }
    }
}

async fn run_realtime(ctx: &Context) -> Result<()> {
    let mut engine = ctx.engine()?;
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        on_signal.cancel();
    });

    eprintln!("Realtime sync running; press Ctrl-C to stop");
    engine
        .run_realtime(WebSocketTransport::new(), shutdown)
        .await?;
    let depth = engine.sync_status()?.depth;
    println!("Stopped ({depth} event(s) still queued)");
    Ok(())
}

pub(crate) fn render_push(report: &PushReport) -> String {
    let mut out = format!(
        "Pushed {} event(s) in {} batch(es)",
        report.acknowledged, report.batches
    );
    if report.rejected > 0 {
        out.push_str(&format!("\n{} rejected, will retry", report.rejected));
    }
    if report.requeued > 0 {
        out.push_str(&format!("\n{} unanswered, requeued", report.requeued));
    }
    for id in &report.failed {
        out.push_str(&format!("\nfailed permanently: {id}"));
    }
    out
}

pub(crate) fn render_pull(report: &PullReport) -> String {
    format!(
        "Pulled {} event(s), {} new (cursor {})",
        report.received, report.applied, report.cursor
    )
}

pub(crate) fn render_sync(report: &SyncReport) -> String {
    format!("{}\n{}", render_push(&report.push), render_pull(&report.pull))
}

pub(crate) fn render_status(status: &SyncStatus) -> String {
    let mut auth = status.auth.state.to_string();
    if let (Some(user), Some(server)) = (&status.auth.username, &status.auth.server_url) {
        auth.push_str(&format!(" ({user} @ {server})"));
    }
    let registered = if status.registered.is_empty() {
        "none".to_string()
    } else {
        status.registered.join(", ")
    };
    let q = &status.queue;
    format!(
        "Auth: {auth}\n\
         Connectivity: {}\n\
         Queue depth: {}\n\
         Queue: {} pending, {} in flight, {} acknowledged, {} failed\n\
         Pull cursor: {}\n\
         Lamport clock: {}\n\
         Node: {}\n\
         Registered: {registered}",
        status.connectivity,
        status.depth,
        q.pending,
        q.in_flight,
        q.acknowledged,
        q.failed,
        status.pull_cursor,
        status.lamport_clock,
        status.node_id,
    )
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
