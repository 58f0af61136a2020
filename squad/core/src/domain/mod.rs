// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod clock;
pub mod config;
pub mod knowledge;
pub mod message;
pub mod sync;
