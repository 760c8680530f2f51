//! The process-wide client: control-file attach, conductor wiring, and the
//! agent runner thread.

use std::sync::Arc;

use crate::agent::AgentRunner;
use crate::conductor::{ClientConductor, ConductorAgent};
use crate::context::Context;
use crate::control::ControlFile;
use crate::counter::Counter;
use crate::counters::CountersReader;
use crate::error::{ClientError, Result};
use crate::idle::IdleStrategy;
use crate::publication::{ExclusivePublication, Publication};
use crate::subscription::Subscription;

/// A connected client.
///
/// Owns the conductor and the thread that services it. All resource
/// operations delegate to the conductor; dropping the client closes it.
pub struct Client {
    conductor: Arc<ClientConductor>,
    runner: Option<AgentRunner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish()
    }
}

impl Client {
    /// Attach to the driver described by `ctx` and start the conductor.
    ///
    /// Fails if the control file is missing or malformed, or if the driver's
    /// keepalive is already stale.
    pub fn connect(ctx: Context) -> Result<Self> {
        ctx.validate()?;

        let control_path = ctx.control_file_path();
        let control = Arc::new(ControlFile::attach(&control_path)?);

        let now_ms = ctx.epoch_clock().millis();
        let last_driver_ms = control.driver_heartbeat_ms();
        if now_ms > last_driver_ms + ctx.driver_timeout_ms() as i64 {
            return Err(ClientError::DriverTimeout(format!(
                "driver inactive or not started: last keepalive {} ms ago",
                now_ms - last_driver_ms
            )));
        }

        let conductor = ClientConductor::new(&ctx, control);
        tracing::debug!(
            client_id = conductor.client_id(),
            dir = %ctx.dir().display(),
            "client connected"
        );

        let runner = AgentRunner::start(
            ConductorAgent::new(conductor.clone()),
            IdleStrategy::Sleep(ctx.idle_sleep_ns()),
            ctx.error_handler().clone(),
        )
        .map_err(ClientError::Io)?;

        Ok(Self {
            conductor,
            runner: Some(runner),
        })
    }

    /// Unique identity of this client with the driver.
    pub fn client_id(&self) -> i64 {
        self.conductor.client_id()
    }

    /// The conductor, for direct access and diagnostics.
    pub fn conductor(&self) -> &Arc<ClientConductor> {
        &self.conductor
    }

    pub fn counters_reader(&self) -> Arc<CountersReader> {
        self.conductor.counters_reader()
    }

    pub fn add_publication(&self, channel: &str, stream_id: i32) -> Result<Arc<Publication>> {
        self.conductor.add_publication(channel, stream_id)
    }

    pub fn add_exclusive_publication(
        &self,
        channel: &str,
        stream_id: i32,
    ) -> Result<Arc<ExclusivePublication>> {
        self.conductor.add_exclusive_publication(channel, stream_id)
    }

    pub fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<Arc<Subscription>> {
        self.conductor.add_subscription(channel, stream_id)
    }

    pub fn add_counter(&self, type_id: i32, key: &[u8], label: &str) -> Result<Arc<Counter>> {
        self.conductor.add_counter(type_id, key, label)
    }

    /// Close the conductor and stop the runner thread. Teardown happens once;
    /// later calls are no-ops.
    pub fn close(&mut self) {
        self.conductor.close();
        if let Some(mut runner) = self.runner.take() {
            runner.stop();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conductor.is_closed()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}
