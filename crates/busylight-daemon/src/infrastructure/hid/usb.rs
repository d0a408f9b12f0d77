//! libusb-backed transport for real Busylight hardware.
//!
//! Busylights are HID devices with one interface carrying an interrupt IN
//! and an interrupt OUT endpoint.  Output reports go out on the OUT endpoint
//! without the leading report-id byte (report id 0 is implicit on the wire).
//! Each open channel has one I/O thread that owns the device handle.  It
//! writes queued reports and reads inbound ones, handing each to the
//! session's [`DataHook`], so no USB transfer ever runs on the event loop.
//! A channel closed and reopened within one read timeout may find the
//! interface still claimed; the open fails and the next keepalive retries.
//!
//! A device's path is its bus number plus port chain (`"1-2.4"`), which stays
//! the same across re-plugs into the same port.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use busylight_core::domain::model::is_supported;
use busylight_core::{DeviceDescriptor, PAYLOAD_LEN, VENDOR_ID};
use rusb::{
    Context, Device, DeviceHandle, GlobalContext, Hotplug, HotplugBuilder, Registration,
    UsbContext,
};
use tracing::{debug, info, trace, warn};

use crate::application::service::ServiceHandle;
use crate::application::transport::{DataHook, HidChannel, HidTransport, TransportError};

const INTERFACE: u8 = 0;
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long one read waits before queued writes get their turn.
const READ_TIMEOUT: Duration = Duration::from_millis(50);
/// How long one libusb event wait lasts before checking for shutdown.
const HOTPLUG_EVENT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default)]
pub struct UsbHidTransport;

impl UsbHidTransport {
    pub fn new() -> Self {
        Self
    }
}

fn device_path(device: &Device<GlobalContext>) -> String {
    let ports = device
        .port_numbers()
        .map(|ports| {
            ports
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(".")
        })
        .unwrap_or_else(|_| format!("addr{}", device.address()));
    format!("{}-{ports}", device.bus_number())
}

fn read_string(handle: &DeviceHandle<GlobalContext>, index: Option<u8>) -> Option<String> {
    match index {
        Some(idx) if idx != 0 => handle.read_string_descriptor_ascii(idx).ok(),
        _ => None,
    }
}

/// Interrupt IN and OUT endpoint addresses of the first interface.
fn find_interrupt_endpoints(device: &Device<GlobalContext>) -> Option<(u8, u8)> {
    let config = device.config_descriptor(0).ok()?;
    let interface = config.interfaces().next()?.descriptors().next()?;
    let mut endpoint_in = None;
    let mut endpoint_out = None;
    for endpoint in interface.endpoint_descriptors() {
        if endpoint.transfer_type() == rusb::TransferType::Interrupt {
            match endpoint.direction() {
                rusb::Direction::In => endpoint_in = Some(endpoint.address()),
                rusb::Direction::Out => endpoint_out = Some(endpoint.address()),
            }
        }
    }
    endpoint_in.zip(endpoint_out)
}

impl HidTransport for UsbHidTransport {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let devices = rusb::devices().map_err(|e| TransportError::Enumerate(e.to_string()))?;
        let mut found = Vec::new();

        for device in devices.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };
            if !is_supported(desc.vendor_id(), desc.product_id()) {
                continue;
            }
            let path = device_path(&device);
            let handle = match device.open() {
                Ok(handle) => handle,
                Err(e) => {
                    debug!("{path}: cannot read descriptors: {e}");
                    continue;
                }
            };
            let Some(serial_number) = read_string(&handle, desc.serial_number_string_index())
            else {
                debug!("{path}: no serial number, skipped");
                continue;
            };
            found.push(DeviceDescriptor {
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
                path,
                serial_number,
                manufacturer: read_string(&handle, desc.manufacturer_string_index())
                    .unwrap_or_default(),
                product: read_string(&handle, desc.product_string_index()).unwrap_or_default(),
            });
        }

        Ok(found)
    }

    fn open(&self, path: &str, on_data: DataHook) -> Result<Box<dyn HidChannel>, TransportError> {
        let open_err = |reason: String| TransportError::Open {
            path: path.to_string(),
            reason,
        };

        let devices = rusb::devices().map_err(|e| open_err(e.to_string()))?;
        let device = devices
            .iter()
            .find(|d| device_path(d) == path)
            .ok_or_else(|| open_err("no such device".into()))?;
        let (endpoint_in, endpoint_out) = find_interrupt_endpoints(&device)
            .ok_or_else(|| open_err("no interrupt endpoints".into()))?;

        let mut handle = device.open().map_err(|e| open_err(e.to_string()))?;
        // Not supported on every platform; claiming still works where it isn't.
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            trace!("{path}: auto-detach unavailable: {e}");
        }
        handle
            .claim_interface(INTERFACE)
            .map_err(|e| open_err(e.to_string()))?;

        let (outbox, inbox) = mpsc::channel();
        let failed = Arc::new(AtomicBool::new(false));
        let worker = IoWorker {
            path: path.to_string(),
            handle,
            endpoint_in,
            endpoint_out,
            inbox,
            failed: Arc::clone(&failed),
            on_data,
        };
        std::thread::Builder::new()
            .name(format!("busylight-io-{path}"))
            .spawn(move || worker.run())
            .map_err(|e| open_err(e.to_string()))?;

        Ok(Box::new(UsbChannel {
            path: path.to_string(),
            outbox: Some(outbox),
            failed,
        }))
    }
}

/// Owns the device handle on its own thread.  Queued reports are written
/// between interrupt reads; the thread releases the interface and exits once
/// the channel's sender is gone or a transfer fails.
struct IoWorker {
    path: String,
    handle: DeviceHandle<GlobalContext>,
    endpoint_in: u8,
    endpoint_out: u8,
    inbox: Receiver<Vec<u8>>,
    failed: Arc<AtomicBool>,
    on_data: DataHook,
}

impl IoWorker {
    fn run(mut self) {
        let mut buf = [0u8; PAYLOAD_LEN];
        'io: loop {
            loop {
                match self.inbox.try_recv() {
                    Ok(report) => {
                        if !self.write(&report) {
                            break 'io;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'io,
                }
            }
            match self
                .handle
                .read_interrupt(self.endpoint_in, &mut buf, READ_TIMEOUT)
            {
                Ok(n) => (self.on_data)(buf[..n].to_vec()),
                Err(rusb::Error::Timeout) => {}
                Err(e) => {
                    debug!("{}: read failed: {e}", self.path);
                    self.failed.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }
        if let Err(e) = self.handle.release_interface(INTERFACE) {
            trace!("{}: release failed: {e}", self.path);
        }
        trace!("{}: interface released", self.path);
    }

    /// Returns `false` after a failed transfer.
    fn write(&self, report: &[u8]) -> bool {
        let reason = match self
            .handle
            .write_interrupt(self.endpoint_out, report, WRITE_TIMEOUT)
        {
            Ok(n) if n == report.len() => return true,
            Ok(n) => format!("short write ({n} of {} bytes)", report.len()),
            Err(e) => e.to_string(),
        };
        warn!("{}: write failed: {reason}", self.path);
        self.failed.store(true, Ordering::Relaxed);
        false
    }
}

/// Queues reports for the [`IoWorker`].  Nothing here blocks, so it is safe
/// to use from the event loop.  A failed transfer is reported by the next
/// `write`, which lets the session reconnect on its following tick.
struct UsbChannel {
    path: String,
    outbox: Option<Sender<Vec<u8>>>,
    failed: Arc<AtomicBool>,
}

impl HidChannel for UsbChannel {
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let outbox = self.outbox.as_ref().ok_or(TransportError::Closed)?;
        let write_err = |reason: &str| TransportError::Write {
            path: self.path.clone(),
            reason: reason.to_string(),
        };
        if self.failed.load(Ordering::Relaxed) {
            return Err(write_err("device stopped responding"));
        }
        let report = frame.get(1..).unwrap_or_default().to_vec();
        outbox
            .send(report)
            .map_err(|_| write_err("I/O thread has exited"))
    }

    fn close(&mut self) {
        // Dropping the sender stops the worker after its current read.
        if self.outbox.take().is_some() {
            trace!("{}: channel closed", self.path);
        }
    }
}

impl Drop for UsbChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Hot-plug notifications ────────────────────────────────────────────────────

/// Asks the service to rediscover on every attach or detach of a device with
/// the Busylight vendor id.  Runs inside libusb's event handling, so it only
/// posts an event and never touches the device.
struct RediscoverOnHotplug {
    handle: ServiceHandle,
}

impl RediscoverOnHotplug {
    fn notify(&self, event: &str, device: &Device<Context>) {
        debug!(
            "usb {event}: bus {} address {}",
            device.bus_number(),
            device.address()
        );
        if self.handle.rediscover().is_err() {
            trace!("busylight service stopped; {event} ignored");
        }
    }
}

impl Hotplug<Context> for RediscoverOnHotplug {
    fn device_arrived(&mut self, device: Device<Context>) {
        self.notify("attach", &device);
    }

    fn device_left(&mut self, device: Device<Context>) {
        self.notify("detach", &device);
    }
}

/// A live libusb hot-plug registration.  Dropping it deregisters the
/// callback and ends the event thread within one event timeout.
pub struct UsbHotplugWatch {
    stop: Arc<AtomicBool>,
    _registration: Registration<Context>,
}

impl Drop for UsbHotplugWatch {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Subscribes to libusb attach/detach notifications.
///
/// Returns `None` when the platform's libusb has no hot-plug support or the
/// registration fails; the caller then falls back to polling.
pub fn watch_usb_hotplug(handle: ServiceHandle) -> Option<UsbHotplugWatch> {
    if !rusb::has_hotplug() {
        info!("libusb hot-plug unsupported on this platform");
        return None;
    }
    let context = Context::new()
        .inspect_err(|e| warn!("libusb context unavailable: {e}"))
        .ok()?;
    let callback: Box<dyn Hotplug<Context>> = Box::new(RediscoverOnHotplug { handle });
    let registration = HotplugBuilder::new()
        .vendor_id(VENDOR_ID)
        .enumerate(false)
        .register(&context, callback)
        .inspect_err(|e| warn!("libusb hot-plug registration failed: {e}"))
        .ok()?;

    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    std::thread::Builder::new()
        .name("busylight-hotplug".to_string())
        .spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                if let Err(e) = context.handle_events(Some(HOTPLUG_EVENT_TIMEOUT)) {
                    warn!("libusb event handling stopped: {e}");
                    break;
                }
            }
        })
        .inspect_err(|e| warn!("cannot start hot-plug thread: {e}"))
        .ok()?;

    Some(UsbHotplugWatch {
        stop,
        _registration: registration,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
