//! `stockroom-desktop`
//!
//! **Responsibility:** the operator-facing side of the stock room.
//!
//! This crate provides:
//! - Operator login against the store
//! - The UI-thread [`Workbench`] (select, add/remove, commit, history)
//! - The background scan bridge feeding item ids to the workbench
//! - Configuration from the environment

pub mod config;
pub mod scan;
pub mod session;
pub mod workbench;

pub use config::{ConfigError, DesktopConfig};
pub use scan::{
    Camera, CameraSource, CodeDecoder, Frame, LineScanner, ScanBridge, ScanConfig, ScanError,
    ScanEvent, ScanHandle, ScanResult, ScanState, TextDecoder, parse_payload,
};
pub use session::{Session, SessionError};
pub use workbench::{Outcome, Prompter, SelectionView, Workbench, WorkbenchError};
