//! Test harness: a scripted stand-in for the media driver.
//!
//! [`StubDriver`] owns the driver side of a control file — the command-ring
//! consumer and the event-ring producer — so tests can decode what the client
//! sent and script the driver's responses. [`AutoDriver`] runs a minimal
//! always-acknowledge driver on its own thread for end-to-end client tests.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use courser::buffers::{LogBuffers, LogBuffersFactory};
use courser::clock::{EpochClock, SystemEpochClock};
use courser::command::{
    CommandDecodeError, command_type, decode_client, decode_counter, decode_destination,
    decode_publication, decode_remove,
};
use courser::control::{CONTROL_FILE_NAME, ControlConfig, ControlFile};
use courser::counters::CountersReader;
use courser::error::DriverErrorCode;
use courser::event::{self, event_type};
use courser::ring::{RingConsumer, RingProducer};

/// An owned, decoded command read from the command ring.
#[derive(Debug, PartialEq, Eq)]
pub enum DriverCommand {
    AddPublication {
        correlation_id: i64,
        stream_id: i32,
        channel: String,
    },
    AddExclusivePublication {
        correlation_id: i64,
        stream_id: i32,
        channel: String,
    },
    AddSubscription {
        correlation_id: i64,
        stream_id: i32,
        channel: String,
    },
    RemovePublication {
        correlation_id: i64,
        registration_id: i64,
    },
    RemoveSubscription {
        correlation_id: i64,
        registration_id: i64,
    },
    RemoveCounter {
        correlation_id: i64,
        registration_id: i64,
    },
    Destination {
        command_type: i32,
        correlation_id: i64,
        registration_id: i64,
        endpoint: String,
    },
    AddCounter {
        correlation_id: i64,
        type_id: i32,
        key: Vec<u8>,
        label: String,
    },
    ClientKeepalive {
        client_id: i64,
    },
    ClientClose {
        client_id: i64,
    },
}

fn decode_command(record_type: i32, payload: &[u8]) -> Result<DriverCommand, CommandDecodeError> {
    Ok(match record_type {
        command_type::ADD_PUBLICATION => {
            let cmd = decode_publication(payload)?;
            DriverCommand::AddPublication {
                correlation_id: cmd.correlation_id,
                stream_id: cmd.stream_id,
                channel: cmd.channel.to_string(),
            }
        }
        command_type::ADD_EXCLUSIVE_PUBLICATION => {
            let cmd = decode_publication(payload)?;
            DriverCommand::AddExclusivePublication {
                correlation_id: cmd.correlation_id,
                stream_id: cmd.stream_id,
                channel: cmd.channel.to_string(),
            }
        }
        command_type::ADD_SUBSCRIPTION => {
            let cmd = decode_publication(payload)?;
            DriverCommand::AddSubscription {
                correlation_id: cmd.correlation_id,
                stream_id: cmd.stream_id,
                channel: cmd.channel.to_string(),
            }
        }
        command_type::REMOVE_PUBLICATION => {
            let cmd = decode_remove(payload)?;
            DriverCommand::RemovePublication {
                correlation_id: cmd.correlation_id,
                registration_id: cmd.registration_id,
            }
        }
        command_type::REMOVE_SUBSCRIPTION => {
            let cmd = decode_remove(payload)?;
            DriverCommand::RemoveSubscription {
                correlation_id: cmd.correlation_id,
                registration_id: cmd.registration_id,
            }
        }
        command_type::REMOVE_COUNTER => {
            let cmd = decode_remove(payload)?;
            DriverCommand::RemoveCounter {
                correlation_id: cmd.correlation_id,
                registration_id: cmd.registration_id,
            }
        }
        command_type::ADD_DESTINATION
        | command_type::REMOVE_DESTINATION
        | command_type::ADD_RCV_DESTINATION
        | command_type::REMOVE_RCV_DESTINATION => {
            let cmd = decode_destination(payload)?;
            DriverCommand::Destination {
                command_type: record_type,
                correlation_id: cmd.correlation_id,
                registration_id: cmd.registration_id,
                endpoint: cmd.endpoint.to_string(),
            }
        }
        command_type::ADD_COUNTER => {
            let cmd = decode_counter(payload)?;
            DriverCommand::AddCounter {
                correlation_id: cmd.correlation_id,
                type_id: cmd.type_id,
                key: cmd.key.to_vec(),
                label: cmd.label.to_string(),
            }
        }
        command_type::CLIENT_KEEPALIVE => {
            let cmd = decode_client(payload)?;
            DriverCommand::ClientKeepalive {
                client_id: cmd.client_id,
            }
        }
        command_type::CLIENT_CLOSE => {
            let cmd = decode_client(payload)?;
            DriverCommand::ClientClose {
                client_id: cmd.client_id,
            }
        }
        other => panic!("unexpected command type {other} ({})", command_type::name(other)),
    })
}

/// Driver side of a control file, driven explicitly by tests.
pub struct StubDriver {
    control: Arc<ControlFile>,
    commands: RingConsumer,
    events: RingProducer,
}

impl StubDriver {
    /// Heap-backed control file shared in-process.
    pub fn heap() -> Self {
        let control = Arc::new(ControlFile::create_heap(ControlConfig::default()));
        Self::over(control)
    }

    /// File-backed control file in `dir`.
    pub fn create_in(dir: &Path) -> Self {
        let control = Arc::new(
            ControlFile::create(&dir.join(CONTROL_FILE_NAME), ControlConfig::default())
                .expect("create control file"),
        );
        Self::over(control)
    }

    fn over(control: Arc<ControlFile>) -> Self {
        let commands = unsafe { RingConsumer::from_region(control.command_ring_region()) };
        let events = unsafe { RingProducer::from_region(control.event_ring_region()) };
        Self {
            control,
            commands,
            events,
        }
    }

    pub fn control(&self) -> Arc<ControlFile> {
        self.control.clone()
    }

    /// Stamp the driver heartbeat with the system wall clock.
    pub fn heartbeat_now(&self) {
        self.control
            .set_driver_heartbeat_ms(SystemEpochClock.millis());
    }

    /// Decode and drain everything in the command ring.
    pub fn drain_commands(&mut self) -> Vec<DriverCommand> {
        let mut out = Vec::new();
        self.commands.read(usize::MAX, |record_type, payload| {
            out.push(decode_command(record_type, payload).expect("malformed command from client"));
        });
        out
    }

    pub fn send(&mut self, event_type: i32, payload: &[u8]) {
        self.events
            .write(event_type, payload)
            .expect("event ring full");
    }

    #[allow(clippy::too_many_arguments)]
    pub fn publication_ready(
        &mut self,
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        publication_limit_id: i32,
        channel_status_id: i32,
        log_file: &str,
    ) {
        self.send(
            event_type::ON_NEW_PUBLICATION,
            &event::encode_new_publication(
                correlation_id,
                registration_id,
                session_id,
                stream_id,
                publication_limit_id,
                channel_status_id,
                log_file,
            ),
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn exclusive_publication_ready(
        &mut self,
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        publication_limit_id: i32,
        channel_status_id: i32,
        log_file: &str,
    ) {
        self.send(
            event_type::ON_NEW_EXCLUSIVE_PUBLICATION,
            &event::encode_new_publication(
                correlation_id,
                registration_id,
                session_id,
                stream_id,
                publication_limit_id,
                channel_status_id,
                log_file,
            ),
        );
    }

    pub fn subscription_ready(&mut self, correlation_id: i64, channel_status_id: i32) {
        self.send(
            event_type::ON_NEW_SUBSCRIPTION,
            &event::encode_new_subscription(correlation_id, channel_status_id),
        );
    }

    pub fn operation_success(&mut self, correlation_id: i64) {
        self.send(
            event_type::ON_OPERATION_SUCCESS,
            &event::encode_operation_success(correlation_id),
        );
    }

    pub fn error(&mut self, correlation_id: i64, code: DriverErrorCode, message: &str) {
        self.send(
            event_type::ON_ERROR,
            &event::encode_error(correlation_id, code, message),
        );
    }

    pub fn channel_endpoint_error(&mut self, status_indicator_id: i32, message: &str) {
        self.send(
            event_type::ON_CHANNEL_ENDPOINT_ERROR,
            &event::encode_channel_endpoint_error(status_indicator_id, message),
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn available_image(
        &mut self,
        correlation_id: i64,
        subscription_registration_id: i64,
        session_id: i32,
        stream_id: i32,
        subscriber_position_id: i32,
        log_file: &str,
        source_identity: &str,
    ) {
        self.send(
            event_type::ON_AVAILABLE_IMAGE,
            &event::encode_available_image(
                correlation_id,
                subscription_registration_id,
                session_id,
                stream_id,
                subscriber_position_id,
                log_file,
                source_identity,
            ),
        );
    }

    pub fn unavailable_image(
        &mut self,
        correlation_id: i64,
        subscription_registration_id: i64,
        stream_id: i32,
    ) {
        self.send(
            event_type::ON_UNAVAILABLE_IMAGE,
            &event::encode_unavailable_image(
                correlation_id,
                subscription_registration_id,
                stream_id,
            ),
        );
    }

    pub fn counter_ready(&mut self, correlation_id: i64, counter_id: i32) {
        self.send(
            event_type::ON_NEW_COUNTER,
            &event::encode_counter_update(correlation_id, counter_id),
        );
    }

    pub fn available_counter(&mut self, registration_id: i64, counter_id: i32) {
        self.send(
            event_type::ON_AVAILABLE_COUNTER,
            &event::encode_counter_update(registration_id, counter_id),
        );
    }

    pub fn unavailable_counter(&mut self, registration_id: i64, counter_id: i32) {
        self.send(
            event_type::ON_UNAVAILABLE_COUNTER,
            &event::encode_counter_update(registration_id, counter_id),
        );
    }

    /// Publish a counter value the way the driver would.
    pub fn set_counter_value(&self, counter_id: i32, value: i64) {
        self.control
            .counter_values_region()
            .atomic_i64_at(CountersReader::counter_offset(counter_id))
            .store(value, Ordering::Release);
    }
}

/// A log-buffers factory that hands out heap buffers, so conductor-level
/// tests need no real log files.
pub struct HeapLogBuffersFactory;

impl LogBuffersFactory for HeapLogBuffersFactory {
    fn map_log_file(&self, _log_file: &str) -> io::Result<Arc<LogBuffers>> {
        Ok(LogBuffers::heap(4096))
    }
}

/// A minimal always-acknowledge driver on its own thread, for end-to-end
/// client tests: acks every command, creates real log files for
/// publications, and keeps its heartbeat fresh.
pub struct AutoDriver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AutoDriver {
    pub fn launch(dir: &Path) -> Self {
        let mut driver = StubDriver::create_in(dir);
        driver.heartbeat_now();

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let log_dir: PathBuf = dir.to_path_buf();

        let handle = std::thread::Builder::new()
            .name("auto-driver".into())
            .spawn(move || {
                let mut next_session_id = 1;
                let mut next_counter_id = 1;
                let mut next_status_id = 100;

                while !thread_stop.load(Ordering::Acquire) {
                    driver.heartbeat_now();
                    for command in driver.drain_commands() {
                        match command {
                            DriverCommand::AddPublication {
                                correlation_id,
                                stream_id,
                                ..
                            }
                            | DriverCommand::AddExclusivePublication {
                                correlation_id,
                                stream_id,
                                ..
                            } => {
                                let log_file = log_dir.join(format!("pub-{correlation_id}.log"));
                                std::fs::write(&log_file, vec![0u8; 4096])
                                    .expect("create log file");
                                let session_id = next_session_id;
                                next_session_id += 1;
                                let status_id = next_status_id;
                                next_status_id += 1;
                                driver.publication_ready(
                                    correlation_id,
                                    correlation_id,
                                    session_id,
                                    stream_id,
                                    next_counter_id,
                                    status_id,
                                    log_file.to_str().expect("utf8 path"),
                                );
                                next_counter_id += 1;
                            }
                            DriverCommand::AddSubscription { correlation_id, .. } => {
                                let status_id = next_status_id;
                                next_status_id += 1;
                                driver.subscription_ready(correlation_id, status_id);
                            }
                            DriverCommand::AddCounter { correlation_id, .. } => {
                                let counter_id = next_counter_id;
                                next_counter_id += 1;
                                driver.counter_ready(correlation_id, counter_id);
                            }
                            DriverCommand::RemovePublication { correlation_id, .. }
                            | DriverCommand::RemoveSubscription { correlation_id, .. }
                            | DriverCommand::RemoveCounter { correlation_id, .. }
                            | DriverCommand::Destination { correlation_id, .. } => {
                                driver.operation_success(correlation_id);
                            }
                            DriverCommand::ClientKeepalive { .. }
                            | DriverCommand::ClientClose { .. } => {}
                        }
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
            .expect("spawn auto driver");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutoDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
