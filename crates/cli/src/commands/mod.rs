// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod auth;
pub mod event;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use tandem_core::SystemClock;

use crate::api::HttpApi;
use crate::auth::{AuthManager, FileCredentialStore};
use crate::cli::OutputFormat;
use crate::config::{config_path, credentials_path, db_path, state_dir, validate_server_url, Config};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::sync::SyncEngine;

/// State directory and configuration shared by every command.
pub struct Context {
    pub state_dir: PathBuf,
    pub config: Config,
}

impl Context {
    /// Resolves the state directory from the environment and loads its config.
    pub fn load() -> Result<Self> {
        Self::at(state_dir()?)
    }

    pub fn at(state_dir: PathBuf) -> Result<Self> {
        let config = Config::load(&state_dir)?;
        Ok(Context { state_dir, config })
    }

    /// Server URL from the command line, else from config.
    pub fn server_url(&self, flag: Option<&str>) -> Result<String> {
        match flag.or(self.config.server_url.as_deref()) {
            Some(url) => validate_server_url(url),
            None => Err(Error::NoServer(
                config_path(&self.state_dir).display().to_string(),
            )),
        }
    }

    pub fn auth(&self) -> Result<Arc<AuthManager<HttpApi>>> {
        let manager = AuthManager::new(
            Arc::new(HttpApi::new()?),
            Arc::new(FileCredentialStore::new(credentials_path(&self.state_dir))),
            Arc::new(SystemClock),
        )?;
        Ok(Arc::new(manager))
    }

    pub fn engine(&self) -> Result<SyncEngine<HttpApi>> {
        let store = Arc::new(Store::open(&db_path(&self.state_dir))?);
        SyncEngine::open(
            self.auth()?,
            store,
            self.config.sync.clone(),
            Arc::new(SystemClock),
            self.config.node_id.clone(),
        )
    }
}

/// Prints `value` as pretty JSON, or the text rendering.
pub fn print<T: serde::Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", text(value)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
