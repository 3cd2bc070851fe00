// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod swarm;

pub use swarm::{RosterError, SwarmRoster};
