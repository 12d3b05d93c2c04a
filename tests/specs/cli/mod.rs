// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

mod auth;
mod common;
mod event;
mod sync;
