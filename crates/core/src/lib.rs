// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 ovpn-connect Contributors

// ovpn-connect - Core Library
// Brings an OpenVPN tunnel to a known-good state by driving the
// external openvpn daemon: config augmentation, secret materialization,
// connectivity probing, detached launch, and log monitoring.

pub mod config;
pub mod error;
pub mod launcher;
pub mod monitor;
pub mod options;
pub mod orchestrator;
pub mod probe;
pub mod secrets;

pub use config::{AugmentedConfig, ConfigAugmenter, Endpoint, Transport};
pub use error::{Error, Result};
pub use launcher::DaemonLauncher;
pub use monitor::{LogMonitor, MonitorOutcome, INIT_COMPLETED_MARKER};
pub use options::BringupOptions;
pub use orchestrator::{Bringup, BringupOutcome, Orchestrator};
pub use probe::{probe_endpoint, ProbeReport, ProbeResult};
