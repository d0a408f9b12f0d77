//! In-memory HID transport.
//!
//! Devices can be attached and detached at runtime, writes and opens can be
//! made to fail per path, and inbound reports can be injected through the
//! hook the session registered.  Every frame written is recorded so tests
//! can assert on exact bytes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use busylight_core::{DeviceDescriptor, FRAME_LEN, PAYLOAD_LEN, VENDOR_ID};

use crate::application::transport::{DataHook, HidChannel, HidTransport, TransportError};

#[derive(Default)]
struct SimState {
    devices: Vec<DeviceDescriptor>,
    frames: HashMap<String, Vec<Vec<u8>>>,
    hooks: HashMap<String, DataHook>,
    open_counts: HashMap<String, usize>,
    fail_open: HashSet<String>,
    fail_write: HashSet<String>,
    enumerate_fails: bool,
}

/// A transport backed by in-memory devices.  Cheap to clone; clones share
/// state.
#[derive(Clone, Default)]
pub struct SimulatedHidTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedHidTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport with `count` Omega devices attached (`SIM00001`, ...).
    pub fn with_devices(count: usize) -> Self {
        let transport = Self::new();
        for n in 1..=count {
            transport.attach(Self::descriptor(&format!("sim-{n}"), &format!("SIM{n:05}")));
        }
        transport
    }

    /// Builds a descriptor for a supported model at `path`.
    pub fn descriptor(path: &str, serial: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: VENDOR_ID,
            product_id: 0x3BCD,
            path: path.to_string(),
            serial_number: serial.to_string(),
            manufacturer: "Plenom A/S".to_string(),
            product: "Busylight Omega".to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach(&self, device: DeviceDescriptor) {
        let mut state = self.lock();
        state.devices.retain(|d| d.path != device.path);
        state.devices.push(device);
    }

    /// Unplugs the device at `path`.  Its channel, if open, starts failing.
    pub fn detach(&self, path: &str) {
        let mut state = self.lock();
        state.devices.retain(|d| d.path != path);
        state.hooks.remove(path);
    }

    pub fn set_fail_open(&self, path: &str, fail: bool) {
        toggle(&mut self.lock().fail_open, path, fail);
    }

    pub fn set_fail_write(&self, path: &str, fail: bool) {
        toggle(&mut self.lock().fail_write, path, fail);
    }

    pub fn set_enumerate_fails(&self, fail: bool) {
        self.lock().enumerate_fails = fail;
    }

    /// Every frame written to `path`, oldest first.
    pub fn frames(&self, path: &str) -> Vec<Vec<u8>> {
        self.lock().frames.get(path).cloned().unwrap_or_default()
    }

    /// Payload (frame minus report id and checksum untouched) of the last
    /// frame written to `path`.
    pub fn last_payload(&self, path: &str) -> Option<[u8; PAYLOAD_LEN]> {
        let state = self.lock();
        let frame = state.frames.get(path)?.last()?;
        frame.get(1..FRAME_LEN)?.try_into().ok()
    }

    pub fn clear_frames(&self, path: &str) {
        self.lock().frames.remove(path);
    }

    /// How many times `path` has been opened.
    pub fn open_count(&self, path: &str) -> usize {
        self.lock().open_counts.get(path).copied().unwrap_or(0)
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.lock().hooks.contains_key(path)
    }

    /// Delivers `bytes` to the data hook of the open channel on `path`.
    /// Returns `false` if nothing is listening.
    pub fn inject_report(&self, path: &str, bytes: &[u8]) -> bool {
        let state = self.lock();
        match state.hooks.get(path) {
            Some(hook) => {
                hook(bytes.to_vec());
                true
            }
            None => false,
        }
    }
}

fn toggle(set: &mut HashSet<String>, path: &str, on: bool) {
    if on {
        set.insert(path.to_string());
    } else {
        set.remove(path);
    }
}

impl HidTransport for SimulatedHidTransport {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let state = self.lock();
        if state.enumerate_fails {
            return Err(TransportError::Enumerate("simulated failure".into()));
        }
        Ok(state.devices.clone())
    }

    fn open(&self, path: &str, on_data: DataHook) -> Result<Box<dyn HidChannel>, TransportError> {
        let mut state = self.lock();
        let present = state.devices.iter().any(|d| d.path == path);
        if !present || state.fail_open.contains(path) {
            return Err(TransportError::Open {
                path: path.to_string(),
                reason: if present { "simulated failure" } else { "no such device" }.into(),
            });
        }
        *state.open_counts.entry(path.to_string()).or_default() += 1;
        state.hooks.insert(path.to_string(), on_data);
        Ok(Box::new(SimulatedChannel {
            path: path.to_string(),
            transport: self.clone(),
            open: true,
        }))
    }
}

struct SimulatedChannel {
    path: String,
    transport: SimulatedHidTransport,
    open: bool,
}

impl HidChannel for SimulatedChannel {
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        let mut state = self.transport.lock();
        let present = state.devices.iter().any(|d| d.path == self.path);
        if !present || state.fail_write.contains(&self.path) {
            return Err(TransportError::Write {
                path: self.path.clone(),
                reason: if present { "simulated failure" } else { "device unplugged" }.into(),
            });
        }
        state
            .frames
            .entry(self.path.clone())
            .or_default()
            .push(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.transport.lock().hooks.remove(&self.path);
        }
    }
}

impl Drop for SimulatedChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
