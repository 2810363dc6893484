//! Filesystem access layer used by sysfs-backed adaptors.
//!
//! Adaptors never touch `std::fs` directly; they go through a
//! [`Filesystem`], so tests can swap in a [`MockFilesystem`].

mod analog_pin;
mod mock;

pub use analog_pin::{AnalogPinConfig, SysfsAnalogPin};
pub use mock::MockFilesystem;

use std::io::{Read, Write};

use ferrobot_types::FerroError;

/// Minimal file access needed for sysfs attributes.
pub trait Filesystem: Send + Sync {
    /// Read at most `max_len` bytes from the start of `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or read.
    fn read_file(&self, path: &str, max_len: usize) -> Result<Vec<u8>, FerroError>;

    /// Replace the contents of `path` with `data`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or written.
    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FerroError>;

    fn exists(&self, path: &str) -> bool;
}

/// The host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFilesystem;

impl Filesystem for NativeFilesystem {
    fn read_file(&self, path: &str, max_len: usize) -> Result<Vec<u8>, FerroError> {
        let file = std::fs::File::open(path).map_err(|e| FerroError::io(path, e.to_string()))?;
        let mut buf = Vec::with_capacity(max_len);
        file.take(max_len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| FerroError::io(path, e.to_string()))?;
        Ok(buf)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FerroError> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| FerroError::io(path, e.to_string()))?;
        file.write_all(data).map_err(|e| FerroError::io(path, e.to_string()))
    }

    fn exists(&self, path: &str) -> bool {
        std::path::Path::new(path).exists()
    }
}
