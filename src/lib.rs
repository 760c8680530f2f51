//! High-throughput, low-latency messaging client over shared memory.
//!
//! The client talks to an out-of-process media driver through a memory-mapped
//! control file: commands go out on one record ring, driver events come back
//! on another, and the data plane lives in separately mapped log files.
//!
//! ```text
//!  application threads                 media driver (separate process)
//!  ┌──────────────────┐               ┌──────────────────────────────┐
//!  │ add_publication  │   commands ►  │                              │
//!  │ add_subscription ├───────────────┤  owns endpoints, log files,  │
//!  │ add_counter ...  │  ◄ events     │  counters                    │
//!  └───────┬──────────┘               └──────────────────────────────┘
//!          │ one lock
//!  ┌───────┴──────────┐
//!  │ client conductor │  correlates commands with events, owns the
//!  │  (agent thread)  │  refcounted log-buffer lifecycle, enforces
//!  └──────────────────┘  liveness timeouts
//! ```
//!
//! The conductor is the hard part: see [`conductor::ClientConductor`]. The
//! usual entry point is [`Client::connect`] with a [`Context`].

pub mod agent;
pub mod buffers;
pub mod client;
pub mod clock;
pub mod command;
pub mod conductor;
pub mod context;
pub mod control;
pub mod counter;
pub mod counters;
pub mod error;
pub mod event;
pub mod idle;
pub mod proxy;
pub mod publication;
pub mod region;
pub mod ring;
pub mod subscription;

pub use agent::{Agent, AgentRunner};
pub use buffers::{LogBuffers, LogBuffersFactory, MappedLogBuffersFactory};
pub use client::Client;
pub use clock::{EpochClock, NanoClock, SystemEpochClock, SystemNanoClock};
pub use conductor::{ClientConductor, NO_CORRELATION_ID};
pub use context::Context;
pub use control::{ControlConfig, ControlFile};
pub use counter::Counter;
pub use counters::CountersReader;
pub use error::{ClientError, DriverErrorCode, Result};
pub use idle::IdleStrategy;
pub use publication::{ExclusivePublication, Publication};
pub use subscription::{Image, Subscription};
