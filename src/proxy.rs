//! The driver proxy: the outbound half of the control protocol.
//!
//! Serializes commands onto the command ring, allocating a fresh correlation
//! id from the control file's shared counter for each. Also the conductor's
//! window onto the driver's keepalive timestamp.

use std::sync::Arc;

use crate::command::{self, command_type};
use crate::control::ControlFile;
use crate::error::{ClientError, Result};
use crate::ring::{RingProducer, RingWriteError};

/// Outbound command proxy. One per client; the conductor owns it.
pub struct DriverProxy {
    producer: RingProducer,
    client_id: i64,
    control: Arc<ControlFile>,
}

impl DriverProxy {
    /// The proxy is the sole producer for the control file's command ring on
    /// this client; create at most one per client.
    pub fn new(control: Arc<ControlFile>) -> Self {
        let producer = unsafe { RingProducer::from_region(control.command_ring_region()) };
        // The client identity is itself drawn from the correlation counter,
        // so it is unique across every client of this driver.
        let client_id = control.next_correlation_id();
        Self {
            producer,
            client_id,
            control,
        }
    }

    #[inline]
    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    /// Wall-clock ms of the last driver keepalive observed.
    #[inline]
    pub fn time_of_last_driver_keepalive_ms(&self) -> i64 {
        self.control.driver_heartbeat_ms()
    }

    fn offer(&mut self, command_type: i32, payload: &[u8]) -> Result<()> {
        tracing::trace!(
            command = command::command_type::name(command_type),
            len = payload.len(),
            "issuing driver command"
        );
        self.producer
            .write(command_type, payload)
            .map_err(|e| match e {
                RingWriteError::Full => ClientError::RingFull,
                RingWriteError::TooLarge => {
                    ClientError::InvalidArgument("command exceeds ring record size".into())
                }
            })
    }

    pub fn add_publication(&mut self, channel: &str, stream_id: i32) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::ADD_PUBLICATION,
            &command::encode_publication(correlation_id, stream_id, channel),
        )?;
        Ok(correlation_id)
    }

    pub fn add_exclusive_publication(&mut self, channel: &str, stream_id: i32) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::ADD_EXCLUSIVE_PUBLICATION,
            &command::encode_publication(correlation_id, stream_id, channel),
        )?;
        Ok(correlation_id)
    }

    pub fn remove_publication(&mut self, registration_id: i64) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::REMOVE_PUBLICATION,
            &command::encode_remove(correlation_id, registration_id),
        )?;
        Ok(correlation_id)
    }

    pub fn add_subscription(&mut self, channel: &str, stream_id: i32) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::ADD_SUBSCRIPTION,
            &command::encode_publication(correlation_id, stream_id, channel),
        )?;
        Ok(correlation_id)
    }

    pub fn remove_subscription(&mut self, registration_id: i64) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::REMOVE_SUBSCRIPTION,
            &command::encode_remove(correlation_id, registration_id),
        )?;
        Ok(correlation_id)
    }

    pub fn add_destination(&mut self, registration_id: i64, endpoint: &str) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::ADD_DESTINATION,
            &command::encode_destination(correlation_id, registration_id, endpoint),
        )?;
        Ok(correlation_id)
    }

    pub fn remove_destination(&mut self, registration_id: i64, endpoint: &str) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::REMOVE_DESTINATION,
            &command::encode_destination(correlation_id, registration_id, endpoint),
        )?;
        Ok(correlation_id)
    }

    pub fn add_rcv_destination(&mut self, registration_id: i64, endpoint: &str) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::ADD_RCV_DESTINATION,
            &command::encode_destination(correlation_id, registration_id, endpoint),
        )?;
        Ok(correlation_id)
    }

    pub fn remove_rcv_destination(&mut self, registration_id: i64, endpoint: &str) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::REMOVE_RCV_DESTINATION,
            &command::encode_destination(correlation_id, registration_id, endpoint),
        )?;
        Ok(correlation_id)
    }

    pub fn add_counter(&mut self, type_id: i32, key: &[u8], label: &str) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::ADD_COUNTER,
            &command::encode_counter(correlation_id, type_id, key, label),
        )?;
        Ok(correlation_id)
    }

    pub fn remove_counter(&mut self, registration_id: i64) -> Result<i64> {
        let correlation_id = self.control.next_correlation_id();
        self.offer(
            command_type::REMOVE_COUNTER,
            &command::encode_remove(correlation_id, registration_id),
        )?;
        Ok(correlation_id)
    }

    pub fn send_client_keepalive(&mut self) -> Result<()> {
        self.offer(
            command_type::CLIENT_KEEPALIVE,
            &command::encode_client(self.client_id),
        )
    }

    pub fn client_close(&mut self) -> Result<()> {
        self.offer(
            command_type::CLIENT_CLOSE,
            &command::encode_client(self.client_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{decode_client, decode_publication, decode_remove};
    use crate::control::{ControlConfig, ControlFile};
    use crate::ring::RingConsumer;

    fn proxy_fixture() -> (Arc<ControlFile>, DriverProxy, RingConsumer) {
        let control = Arc::new(ControlFile::create_heap(ControlConfig::default()));
        let proxy = DriverProxy::new(control.clone());
        let consumer = unsafe { RingConsumer::from_region(control.command_ring_region()) };
        (control, proxy, consumer)
    }

    fn read_one(consumer: &mut RingConsumer) -> (i32, Vec<u8>) {
        let mut record = None;
        consumer.read(1, |record_type, payload| {
            record = Some((record_type, payload.to_vec()));
        });
        record.expect("no command in ring")
    }

    #[test]
    fn correlation_ids_are_monotonic() {
        let (_control, mut proxy, _consumer) = proxy_fixture();

        let a = proxy.add_publication("courser:ipc", 1).unwrap();
        let b = proxy.add_subscription("courser:ipc", 2).unwrap();
        let c = proxy.remove_publication(a).unwrap();

        assert!(a < b && b < c);
        assert!(proxy.client_id() < a);
    }

    #[test]
    fn add_publication_reaches_the_ring() {
        let (_control, mut proxy, mut consumer) = proxy_fixture();

        let id = proxy
            .add_publication("courser:udp?endpoint=localhost:40123", 10)
            .unwrap();

        let (record_type, payload) = read_one(&mut consumer);
        assert_eq!(record_type, command_type::ADD_PUBLICATION);

        let decoded = decode_publication(&payload).unwrap();
        assert_eq!(decoded.correlation_id, id);
        assert_eq!(decoded.stream_id, 10);
        assert_eq!(decoded.channel, "courser:udp?endpoint=localhost:40123");
    }

    #[test]
    fn remove_carries_registration_id() {
        let (_control, mut proxy, mut consumer) = proxy_fixture();

        let reg = proxy.add_publication("courser:ipc", 1).unwrap();
        read_one(&mut consumer);

        let id = proxy.remove_publication(reg).unwrap();
        let (record_type, payload) = read_one(&mut consumer);

        assert_eq!(record_type, command_type::REMOVE_PUBLICATION);
        let decoded = decode_remove(&payload).unwrap();
        assert_eq!(decoded.correlation_id, id);
        assert_eq!(decoded.registration_id, reg);
    }

    #[test]
    fn keepalive_and_close_carry_client_id() {
        let (_control, mut proxy, mut consumer) = proxy_fixture();
        let client_id = proxy.client_id();

        proxy.send_client_keepalive().unwrap();
        let (record_type, payload) = read_one(&mut consumer);
        assert_eq!(record_type, command_type::CLIENT_KEEPALIVE);
        assert_eq!(decode_client(&payload).unwrap().client_id, client_id);

        proxy.client_close().unwrap();
        let (record_type, payload) = read_one(&mut consumer);
        assert_eq!(record_type, command_type::CLIENT_CLOSE);
        assert_eq!(decode_client(&payload).unwrap().client_id, client_id);
    }

    #[test]
    fn driver_heartbeat_is_visible() {
        let (control, proxy, _consumer) = proxy_fixture();
        control.set_driver_heartbeat_ms(777);
        assert_eq!(proxy.time_of_last_driver_keepalive_ms(), 777);
    }

    #[test]
    fn full_ring_surfaces_as_ring_full() {
        let (_control, mut proxy, _consumer) = proxy_fixture();

        // Nothing consumes, so the ring eventually fills.
        let channel = "courser:ipc";
        let err = loop {
            match proxy.add_publication(channel, 1) {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, ClientError::RingFull));
    }
}
