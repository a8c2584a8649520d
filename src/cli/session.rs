//! Devices opened in a shell session.

use crate::device::Instrument;
use crate::devices::AnyInstrument;
use crate::error::{InstrumentError, InstrumentResult};

/// A device known to the session. IDs are indices and stay stable, closed
/// devices are kept and shown as disconnected.
#[derive(Debug)]
pub struct SessionEntry {
    /// Driver wrapping the connection
    pub instrument: AnyInstrument,
    /// `*IDN?` response recorded when connecting
    pub identity: String,
    /// `host:port` as typed
    pub address: String,
}

impl SessionEntry {
    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.instrument.device().is_open()
    }
}

/// Device list plus the selected device.
#[derive(Debug, Default)]
pub struct DeviceSession {
    entries: Vec<SessionEntry>,
    selected: Option<usize>,
}

impl DeviceSession {
    /// Empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device and return its ID.
    pub fn add(&mut self, instrument: AnyInstrument, identity: String, address: String) -> usize {
        self.entries.push(SessionEntry { instrument, identity, address });
        self.entries.len() - 1
    }

    /// Number of devices ever added.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no device was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Devices with their IDs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SessionEntry)> {
        self.entries.iter().enumerate()
    }

    /// Device `id`.
    pub fn get_mut(&mut self, id: usize) -> InstrumentResult<&mut SessionEntry> {
        self.entries.get_mut(id).ok_or_else(|| unknown_id(id))
    }

    /// Make `id` the default for commands without an explicit ID.
    pub fn select(&mut self, id: usize) -> InstrumentResult<()> {
        if id >= self.entries.len() {
            return Err(unknown_id(id));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// Currently selected ID.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// `id` if given, otherwise the selected device.
    pub fn resolve(&self, id: Option<usize>) -> InstrumentResult<usize> {
        match id.or(self.selected) {
            Some(id) if id < self.entries.len() => Ok(id),
            Some(id) => Err(unknown_id(id)),
            None => Err(InstrumentError::InvalidArguments(
                "no device ID given and no device selected".to_string(),
            )),
        }
    }

    /// Close device `id`.
    pub async fn disconnect(&mut self, id: usize) -> InstrumentResult<()> {
        self.get_mut(id)?.instrument.device_mut().disconnect().await
    }

    /// Close every open device, returning each outcome.
    pub async fn disconnect_all(&mut self) -> Vec<(usize, InstrumentResult<()>)> {
        let mut outcomes = Vec::new();
        for (id, entry) in self.entries.iter_mut().enumerate() {
            if entry.is_open() {
                outcomes.push((id, entry.instrument.device_mut().disconnect().await));
            }
        }
        outcomes
    }
}

fn unknown_id(id: usize) -> InstrumentError {
    InstrumentError::InvalidArguments(format!(
        "ID {id} not found. Execute command 'active_devices' to get the list of devices"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceConfig};
    use crate::devices::into_instrument;
    use crate::transport::MockTransport;

    fn entry(session: &mut DeviceSession, host: &str) -> (usize, MockTransport) {
        let mock = MockTransport::new();
        let device = Device::with_transport(DeviceConfig::new(host), mock.clone());
        let id = session.add(into_instrument(device, None), "ACME,1".to_string(), host.to_string());
        (id, mock)
    }

    #[test]
    fn test_resolve_uses_selection() {
        let mut session = DeviceSession::new();
        assert!(session.resolve(None).is_err());
        entry(&mut session, "10.0.0.1");
        entry(&mut session, "10.0.0.2");
        assert_eq!(session.resolve(Some(0)).unwrap(), 0);
        assert!(session.resolve(Some(2)).is_err());

        session.select(1).unwrap();
        assert_eq!(session.resolve(None).unwrap(), 1);
        assert!(session.select(5).is_err());
        assert_eq!(session.selected(), Some(1));
    }

    #[tokio::test]
    async fn test_disconnect_all_skips_closed() {
        let mut session = DeviceSession::new();
        let (first, first_mock) = entry(&mut session, "10.0.0.1");
        let (_, second_mock) = entry(&mut session, "10.0.0.2");
        session.disconnect(first).await.unwrap();
        assert!(session.disconnect(first).await.is_err());

        let outcomes = session.disconnect_all().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, 1);
        assert!(first_mock.is_closed());
        assert!(second_mock.is_closed());
        assert_eq!(session.len(), 2);
    }
}
