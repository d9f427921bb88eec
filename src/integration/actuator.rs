//! Byte-oriented command channel to the sorting hardware.
//!
//! Lifecycle commands are newline-terminated ASCII words; verdicts are one
//! byte per finalized object. A failed connect or write leaves the link
//! disconnected and later sends are dropped until [`ActuatorLink::reconnect`]
//! succeeds.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ActuatorConfig;
use crate::fusion::Category;

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("failed to connect to {target}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("write to actuator failed, link marked disconnected")]
    Write(#[source] io::Error),
}

/// Opens the byte sink behind an [`ActuatorLink`].
pub trait Connector: Send {
    fn connect(&mut self) -> io::Result<Box<dyn Write + Send>>;

    /// Human readable target, for logs.
    fn describe(&self) -> String;
}

impl Connector for Box<dyn Connector> {
    fn connect(&mut self) -> io::Result<Box<dyn Write + Send>> {
        (**self).connect()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Device node or file opened for writing, e.g. `/dev/ttyUSB0`.
#[derive(Debug, Clone)]
pub struct DevicePath {
    path: PathBuf,
}

impl DevicePath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Connector for DevicePath {
    fn connect(&mut self) -> io::Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new().write(true).append(true).open(&self.path)?;
        Ok(Box::new(file))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Serial line opened at a fixed baud rate, e.g. `/dev/ttyUSB0` at 115200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialDevice {
    port: String,
    baud_rate: u32,
    timeout: Duration,
    settle: Duration,
}

impl SerialDevice {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            timeout: Duration::from_secs(1),
            settle: Duration::ZERO,
        }
    }

    pub fn from_config(config: &ActuatorConfig) -> Self {
        Self::new(config.port.to_string_lossy(), config.baud_rate)
            .with_timeout(Duration::from_millis(config.timeout_ms))
            .with_settle(Duration::from_millis(config.settle_ms))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait this long after every successful open before handing out the line.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }
}

impl Connector for SerialDevice {
    fn connect(&mut self) -> io::Result<Box<dyn Write + Send>> {
        let port = serialport::new(self.port.as_str(), self.baud_rate)
            .timeout(self.timeout)
            .open()?;
        if !self.settle.is_zero() {
            debug!(port = %self.port, settle = ?self.settle, "waiting for serial line to settle");
            thread::sleep(self.settle);
        }
        Ok(Box::new(port))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }
}

/// In-memory connector; clones share the written bytes.
///
/// `fail_connect` and `fail_writes` simulate an unplugged device.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    written: Arc<Mutex<Vec<u8>>>,
    fail_connect: Arc<Mutex<bool>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        *self.fail_connect.lock() = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

struct MemoryWriter {
    written: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if *self.fail_writes.lock() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connector for MemoryConnector {
    fn connect(&mut self) -> io::Result<Box<dyn Write + Send>> {
        if *self.fail_connect.lock() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no device"));
        }
        Ok(Box::new(MemoryWriter {
            written: Arc::clone(&self.written),
            fail_writes: Arc::clone(&self.fail_writes),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    Start,
    Stop,
    Reset,
}

impl ActuatorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorCommand::Start => "START",
            ActuatorCommand::Stop => "STOP",
            ActuatorCommand::Reset => "RESET",
        }
    }
}

/// Conveyor state as last commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeltStatus {
    #[default]
    Stopped,
    Running,
    Resetting,
}

/// Outcome of a send on a link that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Link is disconnected, nothing was written
    Dropped,
}

pub struct ActuatorLink<K: Connector> {
    connector: K,
    sink: Option<Box<dyn Write + Send>>,
    status: BeltStatus,
}

impl<K: Connector> ActuatorLink<K> {
    /// Create a link and try to connect once.
    ///
    /// A failed connect is logged and leaves the link disconnected.
    pub fn open(connector: K) -> Self {
        let mut link = Self {
            connector,
            sink: None,
            status: BeltStatus::Stopped,
        };
        if let Err(err) = link.reconnect() {
            warn!(error = %err, "actuator unavailable, commands will be dropped");
        }
        link
    }

    /// Drop the current connection, if any, and connect again.
    pub fn reconnect(&mut self) -> Result<(), ActuatorError> {
        self.sink = None;
        let sink = self
            .connector
            .connect()
            .map_err(|source| ActuatorError::Connect {
                target: self.connector.describe(),
                source,
            })?;
        info!(device = %self.connector.describe(), "actuator connected");
        self.sink = Some(sink);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    pub fn status(&self) -> BeltStatus {
        self.status
    }

    /// Send a lifecycle command and update the belt status.
    ///
    /// The status follows the command even when the link is down.
    pub fn send_command(&mut self, command: ActuatorCommand) -> Result<Delivery, ActuatorError> {
        self.status = match command {
            ActuatorCommand::Start => BeltStatus::Running,
            ActuatorCommand::Stop => BeltStatus::Stopped,
            ActuatorCommand::Reset => BeltStatus::Resetting,
        };
        let line = format!("{}\n", command.as_str());
        self.write(line.as_bytes())
    }

    /// Send the one-byte token for a finalized object.
    pub fn send_verdict(&mut self, category: Category) -> Result<Delivery, ActuatorError> {
        self.send_token(category.token())
    }

    /// Send a raw one-byte token.
    pub fn send_token(&mut self, token: u8) -> Result<Delivery, ActuatorError> {
        self.write(&[token])
    }

    /// Mark a pending reset as done; the belt is stopped afterwards.
    pub fn complete_reset(&mut self) {
        if self.status == BeltStatus::Resetting {
            self.status = BeltStatus::Stopped;
        }
    }

    /// Flush and drop the connection.
    pub fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.flush();
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<Delivery, ActuatorError> {
        let Some(sink) = self.sink.as_mut() else {
            debug!(len = bytes.len(), "actuator disconnected, send dropped");
            return Ok(Delivery::Dropped);
        };
        let result = sink.write_all(bytes).and_then(|_| sink.flush());
        match result {
            Ok(()) => Ok(Delivery::Sent),
            Err(err) => {
                self.sink = None;
                Err(ActuatorError::Write(err))
            }
        }
    }
}

impl<K: Connector> Drop for ActuatorLink<K> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<K: Connector> std::fmt::Debug for ActuatorLink<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorLink")
            .field("target", &self.connector.describe())
            .field("connected", &self.is_connected())
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_device_from_config() {
        let config = crate::PipelineConfig::from_toml_str(
            r#"
            [actuator]
            port = "/dev/ttyACM1"
            baud_rate = 9600
            settle_ms = 0
            "#,
        )
        .unwrap()
        .actuator;
        let device = SerialDevice::from_config(&config);

        assert_eq!(device.port(), "/dev/ttyACM1");
        assert_eq!(device.baud_rate(), 9600);
        assert_eq!(device.timeout(), Duration::from_millis(1000));
        assert_eq!(device.settle(), Duration::ZERO);
        assert_eq!(device.describe(), "/dev/ttyACM1 @ 9600 baud");

        let defaults = SerialDevice::from_config(&ActuatorConfig::default());
        assert_eq!(defaults.port(), "/dev/ttyUSB0");
        assert_eq!(defaults.baud_rate(), 115_200);
        assert_eq!(defaults.settle(), Duration::from_secs(2));
    }

    #[test]
    fn test_missing_serial_port_leaves_link_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("ttyMISSING");
        let mut link = ActuatorLink::open(SerialDevice::new(port.to_string_lossy(), 115_200));

        assert!(!link.is_connected());
        assert_eq!(link.send_verdict(Category::Fresh).unwrap(), Delivery::Dropped);
        assert!(matches!(
            link.reconnect(),
            Err(ActuatorError::Connect { target, .. }) if target.ends_with("@ 115200 baud")
        ));
    }

    #[test]
    fn test_commands_and_verdicts() {
        let device = MemoryConnector::new();
        let mut link = ActuatorLink::open(device.clone());
        assert!(link.is_connected());

        assert_eq!(link.send_command(ActuatorCommand::Start).unwrap(), Delivery::Sent);
        assert_eq!(link.status(), BeltStatus::Running);
        link.send_verdict(Category::Fresh).unwrap();
        link.send_verdict(Category::NonTarget).unwrap();
        link.send_command(ActuatorCommand::Stop).unwrap();

        assert_eq!(device.written(), b"START\nFRSTOP\n".to_vec());
        assert_eq!(link.status(), BeltStatus::Stopped);
    }

    #[test]
    fn test_failed_connect_drops_sends() {
        let device = MemoryConnector::new();
        device.set_fail_connect(true);
        let mut link = ActuatorLink::open(device.clone());

        assert!(!link.is_connected());
        assert_eq!(link.send_verdict(Category::Rotten).unwrap(), Delivery::Dropped);
        assert!(device.written().is_empty());

        device.set_fail_connect(false);
        link.reconnect().unwrap();
        assert_eq!(link.send_verdict(Category::Rotten).unwrap(), Delivery::Sent);
        assert_eq!(device.written(), b"R".to_vec());
    }

    #[test]
    fn test_write_error_disconnects() {
        let device = MemoryConnector::new();
        let mut link = ActuatorLink::open(device.clone());

        device.set_fail_writes(true);
        assert!(matches!(
            link.send_command(ActuatorCommand::Start),
            Err(ActuatorError::Write(_))
        ));
        assert!(!link.is_connected());

        device.set_fail_writes(false);
        assert_eq!(link.send_token(b'F').unwrap(), Delivery::Dropped);
        link.reconnect().unwrap();
        assert_eq!(link.send_token(b'F').unwrap(), Delivery::Sent);
        assert_eq!(device.written(), b"F".to_vec());
    }

    #[test]
    fn test_reset_cycle() {
        let mut link = ActuatorLink::open(MemoryConnector::new());
        link.send_command(ActuatorCommand::Reset).unwrap();
        assert_eq!(link.status(), BeltStatus::Resetting);
        link.complete_reset();
        assert_eq!(link.status(), BeltStatus::Stopped);
    }

    #[test]
    fn test_device_path_missing() {
        let mut link = ActuatorLink::open(DevicePath::new("/nonexistent/tty"));
        assert!(!link.is_connected());
        assert!(matches!(
            link.reconnect(),
            Err(ActuatorError::Connect { .. })
        ));
    }

    #[test]
    fn test_device_path_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut link = ActuatorLink::open(DevicePath::new(file.path()));
        link.send_command(ActuatorCommand::Reset).unwrap();
        link.close();
        assert_eq!(std::fs::read(file.path()).unwrap(), b"RESET\n".to_vec());
    }
}
