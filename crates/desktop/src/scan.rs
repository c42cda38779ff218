//! Scan bridge: a background thread turning scanner frames into item ids.
//!
//! The bridge owns the camera for the whole session and never touches the
//! catalog or ledger. Resolved scans are handed to the UI thread over a
//! channel; the UI drains it on its own schedule through [`ScanHandle`].
//!
//! ```text
//! Idle -> Scanning -> Decoded -> Resolving -> Handoff -> Stopped
//!            ^           |           |
//!            +-----------+-----------+   (decode / lookup failure)
//! Scanning -> Stopped                    (stop, camera error)
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use stockroom_core::ItemId;
use stockroom_infra::InventoryStore;

/// Payload fields accepted as the item identifier, in order of preference.
const ID_FIELDS: [&str; 2] = ["item_id", "random_id"];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScanError {
    /// The camera could not be opened or stopped delivering frames. Fatal to
    /// the scan session.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// A detected code did not carry a usable item identifier.
    #[error("could not decode scanned payload: {0}")]
    DecodeError(String),

    /// The identifier could not be resolved to a stored item.
    #[error("lookup failed for {payload:?}: {reason}")]
    LookupFailed { payload: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
    Decoded,
    Resolving,
    Handoff,
    Stopped,
}

/// One scan outcome, consumed once by the UI thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub raw_payload: String,
    /// `None` when the identifier did not resolve.
    pub item_id: Option<ItemId>,
}

/// What the scan thread hands to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Resolved(ScanResult),
    /// The session ended on an error (only `CameraUnavailable` is sent).
    Failed(ScanError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Wait between reads when no code was detected.
    pub poll_interval: Duration,
    /// Pause after a handoff, and how long a rejected payload is ignored.
    pub cooldown: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            cooldown: Duration::from_secs(5),
        }
    }
}

/// Raw image or text read from a scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

/// An acquired camera. Dropping it releases the device.
pub trait Camera {
    /// Next frame, or `Ok(None)` when none is ready yet.
    fn read_frame(&mut self) -> Result<Option<Frame>, ScanError>;
}

/// Opens cameras. `open` runs on the scan thread.
pub trait CameraSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn Camera>, ScanError>;
}

/// Extracts a code payload from a frame, if one is visible.
pub trait CodeDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Parse a scanned payload into an item identifier.
///
/// JSON is tried first: an object with an `item_id` (or `random_id`) field,
/// or a bare JSON string or number. Text that is not JSON is taken as the
/// identifier itself.
pub fn parse_payload(raw: &str) -> Result<ItemId, ScanError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ScanError::DecodeError("empty payload".to_string()));
    }

    let candidate = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(fields)) => {
            let value = ID_FIELDS
                .iter()
                .find_map(|name| fields.get(*name))
                .ok_or_else(|| {
                    ScanError::DecodeError(format!("no {} field in payload", ID_FIELDS[0]))
                })?;
            scalar_to_string(value)?
        }
        Ok(value @ (Value::String(_) | Value::Number(_))) => scalar_to_string(&value)?,
        Ok(other) => {
            return Err(ScanError::DecodeError(format!(
                "unsupported payload shape: {other}"
            )));
        }
        Err(_) => text.to_string(),
    };

    ItemId::new(candidate).map_err(|e| ScanError::DecodeError(e.to_string()))
}

fn scalar_to_string(value: &Value) -> Result<String, ScanError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ScanError::DecodeError(format!(
            "item identifier must be a string or number, got {other}"
        ))),
    }
}

/// Resolves scans on a background thread.
#[derive(Clone)]
pub struct ScanBridge {
    source: Arc<dyn CameraSource>,
    decoder: Arc<dyn CodeDecoder>,
    lookup: Arc<dyn InventoryStore>,
}

impl std::fmt::Debug for ScanBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanBridge").finish_non_exhaustive()
    }
}

impl ScanBridge {
    pub fn new(
        source: Arc<dyn CameraSource>,
        decoder: Arc<dyn CodeDecoder>,
        lookup: Arc<dyn InventoryStore>,
    ) -> Self {
        Self {
            source,
            decoder,
            lookup,
        }
    }

    /// Start one scan session on its own thread.
    pub fn spawn(&self, config: ScanConfig) -> Result<ScanHandle, ScanError> {
        let (events_tx, events_rx) = mpsc::channel::<ScanEvent>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let state = Arc::new(Mutex::new(ScanState::Idle));

        let bridge = self.clone();
        let thread_state = Arc::clone(&state);
        let join = thread::Builder::new()
            .name("scan-bridge".to_string())
            .spawn(move || scan_loop(bridge, config, events_tx, shutdown_rx, thread_state))
            .map_err(|e| {
                ScanError::CameraUnavailable(format!("failed to start scan thread: {e}"))
            })?;

        Ok(ScanHandle {
            events: events_rx,
            shutdown: shutdown_tx,
            state,
            join: Some(join),
        })
    }
}

/// UI-side end of a running scan session.
///
/// Dropping the handle stops the session and waits for the thread.
#[derive(Debug)]
pub struct ScanHandle {
    events: Receiver<ScanEvent>,
    shutdown: Sender<()>,
    state: Arc<Mutex<ScanState>>,
    join: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    pub fn try_recv(&self) -> Option<ScanEvent> {
        self.events.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ScanEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Everything handed off so far.
    pub fn drain(&self) -> Vec<ScanEvent> {
        self.events.try_iter().collect()
    }

    pub fn state(&self) -> ScanState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ScanState::Stopped)
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ScanState::Stopped
    }

    /// Cancel the session and wait until the camera is released.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("scan thread panicked");
            }
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn set_state(state: &Mutex<ScanState>, next: ScanState) {
    if let Ok(mut current) = state.lock() {
        debug!(from = ?*current, to = ?next, "scan state");
        *current = next;
    }
}

/// Marks the session `Stopped` when dropped. Declared before the camera so
/// the camera is released first.
struct StopGuard {
    state: Arc<Mutex<ScanState>>,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        set_state(&self.state, ScanState::Stopped);
        info!("scan session stopped");
    }
}

fn scan_loop(
    bridge: ScanBridge,
    config: ScanConfig,
    events: Sender<ScanEvent>,
    shutdown: Receiver<()>,
    state: Arc<Mutex<ScanState>>,
) {
    let _stopped = StopGuard {
        state: Arc::clone(&state),
    };

    let mut camera = match bridge.source.open() {
        Ok(camera) => camera,
        Err(err) => {
            error!(error = %err, "scan session could not start");
            let _ = events.send(ScanEvent::Failed(err));
            return;
        }
    };
    set_state(&state, ScanState::Scanning);
    info!("scan session started");

    // Last payload that failed to decode or resolve, and when.
    let mut rejected: Option<(String, Instant)> = None;

    loop {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                info!("scan session cancelled");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        let frame = match camera.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                thread::sleep(config.poll_interval);
                continue;
            }
            Err(err) => {
                error!(error = %err, "camera failed during scan");
                let _ = events.send(ScanEvent::Failed(err));
                break;
            }
        };

        let Some(raw) = bridge.decoder.decode(&frame) else {
            thread::sleep(config.poll_interval);
            continue;
        };

        if let Some((last, at)) = &rejected {
            if *last == raw && at.elapsed() < config.cooldown {
                thread::sleep(config.poll_interval);
                continue;
            }
        }

        set_state(&state, ScanState::Decoded);
        let item_id = match parse_payload(&raw) {
            Ok(item_id) => item_id,
            Err(err) => {
                warn!(error = %err, "ignoring scanned code");
                rejected = Some((raw, Instant::now()));
                set_state(&state, ScanState::Scanning);
                continue;
            }
        };

        set_state(&state, ScanState::Resolving);
        let reason = match bridge.lookup.find_item(&item_id) {
            Ok(Some(_)) => {
                set_state(&state, ScanState::Handoff);
                info!(item_id = %item_id, "scan resolved");
                let result = ScanResult {
                    raw_payload: raw,
                    item_id: Some(item_id),
                };
                if events.send(ScanEvent::Resolved(result)).is_ok() {
                    // Cool down before releasing the camera; a stop request
                    // cuts the wait short.
                    let _ = shutdown.recv_timeout(config.cooldown);
                }
                break;
            }
            Ok(None) => "no such item".to_string(),
            Err(err) => err.to_string(),
        };

        let err = ScanError::LookupFailed {
            payload: raw.clone(),
            reason,
        };
        warn!(error = %err, "scan did not resolve; still scanning");
        rejected = Some((raw, Instant::now()));
        set_state(&state, ScanState::Scanning);
    }

    drop(camera);
    debug!("camera released");
}

/// A line-oriented scanner device (keyboard-wedge or serial barcode reader)
/// that emits one payload per line.
///
/// The device is read without blocking on the scan thread itself, so the
/// file is closed as soon as the session's camera is dropped and a later
/// session sees every line written after that.
#[derive(Debug, Clone)]
pub struct LineScanner {
    path: PathBuf,
}

impl LineScanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CameraSource for LineScanner {
    fn open(&self) -> Result<Box<dyn Camera>, ScanError> {
        let file = open_device(&self.path).map_err(|e| {
            ScanError::CameraUnavailable(format!("cannot open {}: {e}", self.path.display()))
        })?;

        debug!(device = %self.path.display(), "scanner device opened");
        Ok(Box::new(LineCamera {
            reader: BufReader::new(file),
            partial: Vec::new(),
        }))
    }
}

#[cfg(unix)]
fn open_device(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_device(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

struct LineCamera {
    reader: BufReader<File>,
    /// Start of a line whose newline has not arrived yet.
    partial: Vec<u8>,
}

impl Camera for LineCamera {
    fn read_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        match self.reader.read_until(b'\n', &mut self.partial) {
            // Nothing more for now; the scanner may still send later.
            Ok(0) => Ok(None),
            Ok(_) if self.partial.ends_with(b"\n") => {
                let mut line = std::mem::take(&mut self.partial);
                line.pop();
                Ok(Some(Frame::new(line)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(ScanError::CameraUnavailable(format!(
                "scanner read failed: {e}"
            ))),
        }
    }
}

/// Decoder for scanners that already deliver text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl CodeDecoder for TextDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        std::str::from_utf8(&frame.data)
            .ok()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use stockroom_core::OperatorId;
    use stockroom_infra::{InMemoryStore, ItemRecord, StoreError};
    use stockroom_inventory::{AuditEntry, PendingDelta};

    const WAIT: Duration = Duration::from_secs(2);

    struct ScriptedCamera {
        frames: VecDeque<Result<&'static str, ScanError>>,
        released: Arc<AtomicBool>,
    }

    impl Camera for ScriptedCamera {
        fn read_frame(&mut self) -> Result<Option<Frame>, ScanError> {
            match self.frames.pop_front() {
                Some(Ok(text)) => Ok(Some(Frame::new(text))),
                Some(Err(err)) => Err(err),
                None => Ok(None),
            }
        }
    }

    impl Drop for ScriptedCamera {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedSource {
        frames: Vec<Result<&'static str, ScanError>>,
        available: bool,
        released: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Result<&'static str, ScanError>>) -> Self {
            Self {
                frames,
                available: true,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl CameraSource for ScriptedSource {
        fn open(&self) -> Result<Box<dyn Camera>, ScanError> {
            if !self.available {
                return Err(ScanError::CameraUnavailable("no camera".to_string()));
            }
            Ok(Box::new(ScriptedCamera {
                frames: self.frames.clone().into(),
                released: Arc::clone(&self.released),
            }))
        }
    }

    /// Camera that shows the same code on every frame.
    struct HeldCode(&'static str);

    impl CameraSource for HeldCode {
        fn open(&self) -> Result<Box<dyn Camera>, ScanError> {
            Ok(Box::new(HeldCode(self.0)))
        }
    }

    impl Camera for HeldCode {
        fn read_frame(&mut self) -> Result<Option<Frame>, ScanError> {
            Ok(Some(Frame::new(self.0)))
        }
    }

    /// Counts the lookups made by the scan thread.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryStore,
        lookups: AtomicUsize,
    }

    impl CountingStore {
        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    impl InventoryStore for CountingStore {
        fn load_catalog(&self) -> Result<Vec<ItemRecord>, StoreError> {
            self.inner.load_catalog()
        }
        fn apply_deltas(&self, deltas: &[PendingDelta]) -> Result<(), StoreError> {
            self.inner.apply_deltas(deltas)
        }
        fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
            self.inner.append_audit(entry)
        }
        fn find_item(&self, item_id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_item(item_id)
        }
        fn verify_credentials(&self, o: &OperatorId, c: &str) -> Result<bool, StoreError> {
            self.inner.verify_credentials(o, c)
        }
        fn audit_history(&self, item_id: &ItemId) -> Result<Vec<AuditEntry>, StoreError> {
            self.inner.audit_history(item_id)
        }
    }

    fn store() -> Arc<dyn InventoryStore> {
        Arc::new(InMemoryStore::new().with_item(ItemId::new("A1").unwrap(), "Widget", 10.0))
    }

    fn config() -> ScanConfig {
        ScanConfig {
            poll_interval: Duration::from_millis(5),
            cooldown: Duration::from_millis(20),
        }
    }

    fn bridge(source: Arc<ScriptedSource>) -> ScanBridge {
        ScanBridge::new(source, Arc::new(TextDecoder), store())
    }

    fn wait_for_state(handle: &ScanHandle, state: ScanState) {
        let deadline = Instant::now() + WAIT;
        while handle.state() != state && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_until_stopped(handle: &ScanHandle) {
        wait_for_state(handle, ScanState::Stopped);
    }

    #[test]
    fn payload_forms() {
        let a1 = ItemId::new("A1").unwrap();
        assert_eq!(parse_payload(r#"{"item_id": "A1"}"#), Ok(a1.clone()));
        assert_eq!(parse_payload(r#"{"random_id": "A1", "x": 1}"#), Ok(a1.clone()));
        assert_eq!(parse_payload(r#""A1""#), Ok(a1.clone()));
        assert_eq!(parse_payload("  A1\n"), Ok(a1));
        assert_eq!(parse_payload("4711"), Ok(ItemId::new("4711").unwrap()));
        assert_eq!(
            parse_payload(r#"{"random_id": 42}"#),
            Ok(ItemId::new("42").unwrap())
        );
    }

    #[test]
    fn undecodable_payloads() {
        for raw in ["", "   ", r#"{"sku": "A1"}"#, r#"{"item_id": null}"#, "[1, 2]", "true"] {
            assert!(
                matches!(parse_payload(raw), Err(ScanError::DecodeError(_))),
                "{raw:?} should not decode"
            );
        }
    }

    #[test]
    fn resolved_scan_is_handed_off_and_session_ends() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(r#"{"item_id": "A1"}"#)]));
        let handle = bridge(Arc::clone(&source)).spawn(config()).unwrap();

        let event = handle.recv_timeout(WAIT).unwrap();
        assert_eq!(
            event,
            ScanEvent::Resolved(ScanResult {
                raw_payload: r#"{"item_id": "A1"}"#.to_string(),
                item_id: Some(ItemId::new("A1").unwrap()),
            })
        );

        wait_until_stopped(&handle);
        assert_eq!(handle.state(), ScanState::Stopped);
        assert!(source.released.load(Ordering::SeqCst));
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn unknown_id_keeps_scanning() {
        let source = Arc::new(ScriptedSource::new(vec![Ok("Z9")]));
        let handle = bridge(Arc::clone(&source)).spawn(config()).unwrap();

        assert_eq!(handle.recv_timeout(Duration::from_millis(150)), None);
        assert_eq!(handle.state(), ScanState::Scanning);
        assert!(!source.released.load(Ordering::SeqCst));

        handle.stop();
        assert!(source.released.load(Ordering::SeqCst));
    }

    #[test]
    fn bad_payload_then_good_one() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(r#"{"sku": "A1"}"#),
            Ok("Z9"),
            Ok("A1"),
        ]));
        let handle = bridge(source).spawn(config()).unwrap();

        match handle.recv_timeout(WAIT) {
            Some(ScanEvent::Resolved(result)) => {
                assert_eq!(result.item_id, Some(ItemId::new("A1").unwrap()));
            }
            other => panic!("expected a resolved scan, got {other:?}"),
        }
    }

    #[test]
    fn camera_unavailable_is_reported_once() {
        let mut source = ScriptedSource::new(vec![Ok("A1")]);
        source.available = false;
        let handle = bridge(Arc::new(source)).spawn(config()).unwrap();

        assert!(matches!(
            handle.recv_timeout(WAIT),
            Some(ScanEvent::Failed(ScanError::CameraUnavailable(_)))
        ));
        wait_until_stopped(&handle);
        assert!(handle.is_stopped());
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn camera_failure_mid_session_releases_camera() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok("Z9"),
            Err(ScanError::CameraUnavailable("unplugged".to_string())),
        ]));
        let handle = bridge(Arc::clone(&source)).spawn(config()).unwrap();

        assert_eq!(
            handle.recv_timeout(WAIT),
            Some(ScanEvent::Failed(ScanError::CameraUnavailable(
                "unplugged".to_string()
            )))
        );
        wait_until_stopped(&handle);
        assert!(source.released.load(Ordering::SeqCst));
    }

    #[test]
    fn line_scanner_reads_device_lines() {
        let mut device = tempfile::NamedTempFile::new().unwrap();
        writeln!(device, "Z9").unwrap();
        writeln!(device, r#"{{"random_id": "A1"}}"#).unwrap();
        device.flush().unwrap();

        let bridge = ScanBridge::new(
            Arc::new(LineScanner::new(device.path())),
            Arc::new(TextDecoder),
            store(),
        );
        let handle = bridge.spawn(config()).unwrap();

        match handle.recv_timeout(WAIT) {
            Some(ScanEvent::Resolved(result)) => {
                assert_eq!(result.raw_payload, r#"{"random_id": "A1"}"#);
            }
            other => panic!("expected a resolved scan, got {other:?}"),
        }
    }

    #[test]
    fn missing_device_is_camera_unavailable() {
        let source = LineScanner::new("/nonexistent/scanner");
        assert!(matches!(
            source.open(),
            Err(ScanError::CameraUnavailable(_))
        ));
    }

    #[test]
    fn handoff_keeps_the_camera_for_the_cooldown() {
        let source = Arc::new(ScriptedSource::new(vec![Ok("A1")]));
        let cooldown = Duration::from_millis(300);
        let handle = bridge(Arc::clone(&source))
            .spawn(ScanConfig {
                poll_interval: Duration::from_millis(5),
                cooldown,
            })
            .unwrap();

        assert!(matches!(
            handle.recv_timeout(WAIT),
            Some(ScanEvent::Resolved(_))
        ));
        let handed_off = Instant::now();
        assert_eq!(handle.state(), ScanState::Handoff);
        assert!(!source.released.load(Ordering::SeqCst));

        wait_until_stopped(&handle);
        assert!(handle.is_stopped());
        assert!(source.released.load(Ordering::SeqCst));
        assert!(handed_off.elapsed() >= cooldown / 2);
    }

    #[test]
    fn stop_cuts_the_handoff_cooldown_short() {
        let source = Arc::new(ScriptedSource::new(vec![Ok("A1")]));
        let handle = bridge(Arc::clone(&source))
            .spawn(ScanConfig {
                poll_interval: Duration::from_millis(5),
                cooldown: Duration::from_secs(30),
            })
            .unwrap();
        assert!(handle.recv_timeout(WAIT).is_some());

        let stopping = Instant::now();
        handle.stop();
        assert!(stopping.elapsed() < Duration::from_secs(5));
        assert!(source.released.load(Ordering::SeqCst));
    }

    #[test]
    fn held_rejected_code_is_looked_up_once_per_cooldown() {
        let lookups = Arc::new(CountingStore::default());
        let bridge = ScanBridge::new(
            Arc::new(HeldCode("Z9")),
            Arc::new(TextDecoder),
            Arc::clone(&lookups) as Arc<dyn InventoryStore>,
        );
        let handle = bridge
            .spawn(ScanConfig {
                poll_interval: Duration::from_millis(5),
                cooldown: Duration::from_secs(30),
            })
            .unwrap();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(handle.state(), ScanState::Scanning);
        assert!(handle.drain().is_empty());
        handle.stop();

        assert_eq!(lookups.lookups(), 1);
    }

    #[test]
    fn held_rejected_code_is_retried_after_the_cooldown() {
        let lookups = Arc::new(CountingStore::default());
        let bridge = ScanBridge::new(
            Arc::new(HeldCode("Z9")),
            Arc::new(TextDecoder),
            Arc::clone(&lookups) as Arc<dyn InventoryStore>,
        );
        let handle = bridge
            .spawn(ScanConfig {
                poll_interval: Duration::from_millis(5),
                cooldown: Duration::from_millis(50),
            })
            .unwrap();

        thread::sleep(Duration::from_millis(300));
        handle.stop();

        let lookups = lookups.lookups();
        assert!((2..=8).contains(&lookups), "{lookups} lookups");
    }

    #[cfg(target_os = "linux")]
    fn make_fifo(path: &Path) {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0, "mkfifo: {}", io::Error::last_os_error());
    }

    /// Open file descriptors of this process that point at `path`.
    #[cfg(target_os = "linux")]
    fn open_handles(path: &Path) -> usize {
        let path = path.canonicalize().unwrap();
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|fd| std::fs::read_link(fd.ok()?.path()).ok())
            .filter(|target| *target == path)
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn stopped_line_scanner_releases_device_and_leaves_next_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scanner");
        make_fifo(&path);
        // Held open for the whole test so the device never reports end of input.
        let mut device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();

        let bridge = ScanBridge::new(
            Arc::new(LineScanner::new(&path)),
            Arc::new(TextDecoder),
            store(),
        );

        let first = bridge.spawn(config()).unwrap();
        wait_for_state(&first, ScanState::Scanning);
        assert_eq!(first.state(), ScanState::Scanning);
        assert_eq!(open_handles(&path), 2);
        first.stop();
        assert_eq!(open_handles(&path), 1);

        writeln!(device, "A1").unwrap();
        device.flush().unwrap();

        let second = bridge.spawn(config()).unwrap();
        match second.recv_timeout(WAIT) {
            Some(ScanEvent::Resolved(result)) => {
                assert_eq!(result.item_id, Some(ItemId::new("A1").unwrap()));
            }
            other => panic!("expected the next code in the next session, got {other:?}"),
        }
    }
}
