//! Mock mesh transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{MeshConfig, MeshEvent, MeshTransport, TransportError};
use crate::protocol::LINK_TAG_LEN;

/// Mock transport for unit testing state machine and session logic.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued responses to DFU sends.
    response_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Queued asynchronous events.
    event_queue: Arc<Mutex<VecDeque<MeshEvent>>>,
    /// Captured DFU sends.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Mesh configurations passed to `initialize`.
    init_log: Arc<Mutex<Vec<MeshConfig>>>,
    /// Number of radio resets requested.
    resets: Arc<Mutex<usize>>,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            response_queue: Arc::new(Mutex::new(VecDeque::new())),
            event_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            init_log: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(Mutex::new(0)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue the response returned by the next `send_dfu`.
    pub fn queue_response(&self, response: &[u8]) {
        self.response_queue
            .lock()
            .unwrap()
            .push_back(response.to_vec());
    }

    /// Queue a 2-byte acknowledgement of `handle`.
    pub fn queue_ack(&self, handle: u16) {
        self.queue_response(&handle.to_le_bytes());
    }

    /// Queue an asynchronous event.
    pub fn queue_event(&self, event: MeshEvent) {
        self.event_queue.lock().unwrap().push_back(event);
    }

    /// Queue a DFU event carrying `message`, prefixed with a zero link tag.
    pub fn queue_dfu_event(&self, message: &[u8]) {
        let mut payload = vec![0u8; LINK_TAG_LEN];
        payload.extend_from_slice(message);
        self.queue_event(MeshEvent::Dfu(payload));
    }

    /// Get all captured DFU sends.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    pub fn init_calls(&self) -> Vec<MeshConfig> {
        self.init_log.lock().unwrap().clone()
    }

    pub fn reset_count(&self) -> usize {
        *self.resets.lock().unwrap()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshTransport for MockTransport {
    fn initialize(&self, config: &MeshConfig) -> Result<(), TransportError> {
        self.check_connected()?;
        self.init_log.lock().unwrap().push(*config);
        Ok(())
    }

    fn radio_reset(&self) -> Result<(), TransportError> {
        self.check_connected()?;
        *self.resets.lock().unwrap() += 1;
        Ok(())
    }

    fn send_dfu(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.check_connected()?;
        self.write_log.lock().unwrap().push(payload.to_vec());
        self.response_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 5000 })
    }

    fn next_event(&self) -> Result<MeshEvent, TransportError> {
        self.check_connected()?;
        self.event_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 5000 })
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;

    #[test]
    fn test_mock_response_queue() {
        let mock = MockTransport::new();
        mock.queue_ack(HANDLE_FWID);
        mock.queue_response(&[0x01]);

        assert_eq!(mock.send_dfu(b"a").unwrap(), vec![0xFE, 0xFF]);
        assert_eq!(mock.send_dfu(b"b").unwrap(), vec![0x01]);

        // Queue is empty now
        assert!(matches!(
            mock.send_dfu(b"c"),
            Err(TransportError::Timeout { .. })
        ));
        assert_eq!(mock.get_writes().len(), 3);
    }

    #[test]
    fn test_mock_events() {
        let mock = MockTransport::new();
        mock.queue_event(MeshEvent::DeviceStarted(vec![0x02]));
        mock.queue_dfu_event(&[0xFE, 0xFF]);

        assert_eq!(
            mock.next_event().unwrap(),
            MeshEvent::DeviceStarted(vec![0x02])
        );
        assert_eq!(
            mock.next_event().unwrap(),
            MeshEvent::Dfu(vec![0x00, 0x00, 0xFE, 0xFF])
        );
        assert!(mock.next_event().is_err());
    }

    #[test]
    fn test_mock_init_and_reset() {
        let mock = MockTransport::new();
        mock.radio_reset().unwrap();
        mock.initialize(&MeshConfig::default()).unwrap();
        assert_eq!(mock.reset_count(), 1);
        assert_eq!(mock.init_calls(), vec![MeshConfig::default()]);
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.disconnect();
        assert!(!mock.is_connected());
        assert!(matches!(
            mock.send_dfu(b"test"),
            Err(TransportError::Disconnected)
        ));

        mock.reconnect();
        mock.clear_writes();
        assert!(mock.get_writes().is_empty());
    }
}
