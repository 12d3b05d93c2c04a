// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `tandem auth` commands.

use std::io::BufRead;

use super::{print, Context};
use crate::auth::{AuthState, AuthStatus};
use crate::cli::AuthCommand;
use crate::env;
use crate::error::{Error, Result};

pub async fn run(ctx: &Context, command: AuthCommand) -> Result<()> {
    match command {
        AuthCommand::Login {
            username,
            server,
            force,
        } => login(ctx, &username, server.as_deref(), force).await,
        AuthCommand::Logout => logout(ctx),
        AuthCommand::Status(args) => {
            let status = ctx.auth()?.status();
            print(args.output, &status, render_status)
        }
    }
}

async fn login(ctx: &Context, username: &str, server: Option<&str>, force: bool) -> Result<()> {
    let server_url = ctx.server_url(server)?;
    let password = match env::password() {
        Some(password) => password,
        None => read_password(std::io::stdin().lock())?,
    };
    let status = ctx
        .auth()?
        .login(username, &password, &server_url, force)
        .await?;
    println!(
        "Logged in as {} on {}",
        username,
        status.server_url.as_deref().unwrap_or(&server_url)
    );
    Ok(())
}

fn logout(ctx: &Context) -> Result<()> {
    if ctx.auth()?.logout()? {
        println!("Logged out");
    } else {
        println!("Not logged in");
    }
    Ok(())
}

/// Reads the password from the first line of `input`.
pub(crate) fn read_password(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(Error::InvalidInput(
            "no password given\n  hint: pipe it on stdin or set TANDEM_PASSWORD".to_string(),
        ));
    }
    Ok(password.to_string())
}

pub(crate) fn render_status(status: &AuthStatus) -> String {
    let mut out = format!("State: {}", status.state);
    if status.state == AuthState::Unauthenticated {
        out.push_str("\nNot logged in");
        return out;
    }
    if let Some(username) = &status.username {
        out.push_str(&format!("\nUser: {username}"));
    }
    if let Some(server) = &status.server_url {
        out.push_str(&format!("\nServer: {server}"));
    }
    if let Some(expiry) = status.access_expiry {
        out.push_str(&format!(
            "\nAccess token expires: {}",
            expiry.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    out
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
