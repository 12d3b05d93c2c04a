// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle: login, logout, silent refresh and ephemeral stream
//! tokens.

mod credentials;
mod manager;

pub use credentials::{CredentialStore, FileCredentialStore, Session};
pub use manager::{AuthManager, AuthState, AuthStatus, WsToken};
