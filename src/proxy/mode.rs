//! Serving mode switch.
//!
//! # States
//! - Default: cache misses are fetched from the active source
//! - MemoryCache: serve from cache only, never contact sources
//!
//! # Design Decisions
//! - One atomic byte; a switch affects only resolutions that start after it
//! - Requests already parked keep waiting regardless of mode
//! - Switches and mode-gated admin actions are serialized by one lock;
//!   readers never take it

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Default = 0,
    MemoryCache = 1,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Default, Mode::MemoryCache];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Default => "default",
            Mode::MemoryCache => "memorycache",
        }
    }

    /// Case-insensitive lookup.
    pub fn parse(name: &str) -> Result<Mode, ModeError> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ModeError::UnknownMode(name.to_string()))
    }

    /// True if misses may be fetched upstream.
    pub fn requires_config_source(self) -> bool {
        matches!(self, Mode::Default)
    }

    /// `[default, memorycache]`
    pub fn legal_modes() -> String {
        let names: Vec<&str> = Mode::ALL.iter().map(|m| m.name()).collect();
        format!("[{}]", names.join(", "))
    }
}

impl From<u8> for Mode {
    fn from(val: u8) -> Self {
        match val {
            1 => Mode::MemoryCache,
            _ => Mode::Default,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("Could not set mode to '{0}'. Legal modes are '{legal}'", legal = Mode::legal_modes())]
    UnknownMode(String),
    #[error("Cannot update sources when in '{0}' mode")]
    SourcesLocked(Mode),
}

/// Process-wide mode, shared by the orchestrator and the refresher.
#[derive(Debug, Default)]
pub struct ModeController {
    mode: AtomicU8,
    switch: Mutex<()>,
}

impl ModeController {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode: AtomicU8::new(mode as u8),
            switch: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Mode {
        Mode::from(self.mode.load(Ordering::Acquire))
    }

    /// Run `f` with the current mode, holding off switches until it returns.
    pub fn with_current<R>(&self, f: impl FnOnce(Mode) -> R) -> R {
        let _switch = self.switch.lock();
        f(self.get())
    }

    pub fn set(&self, mode: Mode) {
        let _switch = self.switch.lock();
        let previous = Mode::from(self.mode.swap(mode as u8, Ordering::AcqRel));
        if previous != mode {
            tracing::info!(from = %previous, to = %mode, "Mode changed");
        }
    }

    /// Switch by name. An unknown name changes nothing.
    pub fn set_by_name(&self, name: &str) -> Result<Mode, ModeError> {
        let mode = Mode::parse(name)?;
        self.set(mode);
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Mode::parse("MemoryCache").unwrap(), Mode::MemoryCache);
        assert_eq!(Mode::parse("DEFAULT").unwrap(), Mode::Default);
    }

    #[test]
    fn unknown_mode_message() {
        let controller = ModeController::new(Mode::Default);
        let err = controller.set_by_name("turbo").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not set mode to 'turbo'. Legal modes are '[default, memorycache]'"
        );
        assert_eq!(controller.get(), Mode::Default);
    }

    #[test]
    fn switch_waits_for_gated_action() {
        let controller = &ModeController::new(Mode::Default);
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        std::thread::scope(|s| {
            let seen = controller.with_current(|mode| {
                s.spawn(move || {
                    entered_rx.recv().unwrap();
                    controller.set(Mode::MemoryCache);
                });
                entered_tx.send(()).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(50));
                assert_eq!(controller.get(), Mode::Default);
                mode
            });
            assert_eq!(seen, Mode::Default);
        });
        assert_eq!(controller.get(), Mode::MemoryCache);
    }

    #[test]
    fn switch_is_immediate() {
        let controller = ModeController::default();
        assert!(controller.get().requires_config_source());
        controller.set_by_name("memorycache").unwrap();
        assert_eq!(controller.get(), Mode::MemoryCache);
        assert!(!controller.get().requires_config_source());
        assert_eq!(controller.get().to_string(), "memorycache");
    }
}
