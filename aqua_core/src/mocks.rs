//! Test and helper mocks for aqua_core

use std::collections::{HashMap, VecDeque};

use aqua_traits::{BoxError, CharacteristicHandle, Link, LinkEvent, LinkFault, PeerInfo};
use uuid::Uuid;

use crate::codec::Frame;
use crate::config::LinkProfile;

pub const TIME_HANDLE: CharacteristicHandle = CharacteristicHandle(0x21);
pub const CONFIG_HANDLE: CharacteristicHandle = CharacteristicHandle(0x22);
pub const TEST_HANDLE: CharacteristicHandle = CharacteristicHandle(0x23);

/// A link whose inbound traffic is queued by the test and whose writes are recorded.
///
/// Reach it through `Session::link_mut()` after handing it to the session.
#[derive(Debug)]
pub struct ScriptedLink {
    service: Uuid,
    handles: HashMap<Uuid, CharacteristicHandle>,
    connected: bool,
    peer_name: Option<String>,
    pub fail_connect: Option<LinkFault>,
    pub fail_writes: Option<LinkFault>,
    inbound: VecDeque<LinkEvent>,
    writes: Vec<(CharacteristicHandle, Vec<u8>)>,
    subscriptions: HashMap<CharacteristicHandle, u32>,
    connects: u32,
}

impl ScriptedLink {
    pub fn new(profile: &LinkProfile) -> Self {
        let handles = HashMap::from([
            (profile.time, TIME_HANDLE),
            (profile.config, CONFIG_HANDLE),
            (profile.dose_test, TEST_HANDLE),
        ]);
        Self {
            service: profile.service,
            handles,
            connected: false,
            peer_name: None,
            fail_connect: None,
            fail_writes: None,
            inbound: VecDeque::new(),
            writes: Vec::new(),
            subscriptions: HashMap::new(),
            connects: 0,
        }
    }

    #[must_use]
    pub fn with_peer_name(mut self, name: &str) -> Self {
        self.peer_name = Some(name.to_string());
        self
    }

    pub fn notify(&mut self, handle: CharacteristicHandle, bytes: &[u8]) {
        self.inbound.push_back(LinkEvent::Notification {
            handle,
            bytes: bytes.to_vec(),
        });
    }

    pub fn notify_frames(&mut self, frames: &[Frame]) {
        for f in frames {
            self.notify(CONFIG_HANDLE, f.as_bytes());
        }
    }

    /// Queue an unsolicited link loss.
    pub fn drop_link(&mut self) {
        self.connected = false;
        self.inbound.push_back(LinkEvent::Disconnected);
    }

    pub fn writes_to(&self, handle: CharacteristicHandle) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn subscription_count(&self, handle: CharacteristicHandle) -> u32 {
        self.subscriptions.get(&handle).copied().unwrap_or(0)
    }

    pub const fn connect_count(&self) -> u32 {
        self.connects
    }

    pub const fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Link for ScriptedLink {
    fn connect(&mut self, device_id: &str) -> Result<PeerInfo, BoxError> {
        self.connects += 1;
        if let Some(fault) = self.fail_connect.clone() {
            return Err(Box::new(fault));
        }
        self.connected = true;
        Ok(PeerInfo {
            id: device_id.to_string(),
            name: self.peer_name.clone(),
        })
    }

    fn disconnect(&mut self) -> Result<(), BoxError> {
        self.connected = false;
        Ok(())
    }

    fn characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, BoxError> {
        if service != self.service {
            return Err(Box::new(LinkFault::DeviceNotFound(service.to_string())));
        }
        self.handles
            .get(&characteristic)
            .copied()
            .ok_or_else(|| Box::new(LinkFault::CharacteristicNotFound(characteristic)) as BoxError)
    }

    fn start_notifications(&mut self, handle: CharacteristicHandle) -> Result<(), BoxError> {
        *self.subscriptions.entry(handle).or_insert(0) += 1;
        Ok(())
    }

    fn write(&mut self, handle: CharacteristicHandle, bytes: &[u8]) -> Result<(), BoxError> {
        if !self.connected {
            return Err(Box::new(LinkFault::NotConnected));
        }
        if let Some(fault) = self.fail_writes.clone() {
            return Err(Box::new(fault));
        }
        self.writes.push((handle, bytes.to_vec()));
        Ok(())
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.inbound.pop_front()
    }
}
