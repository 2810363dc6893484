use std::collections::HashMap;

use ferrobot_types::FerroError;
use parking_lot::Mutex;

use super::Filesystem;

#[derive(Debug, Default, Clone)]
struct MockFile {
    contents: String,
    seq: u64,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<String, MockFile>,
    seq: u64,
    with_read_error: bool,
    with_write_error: bool,
}

/// In-memory [`Filesystem`] with injectable read/write failures.
///
/// Every read or write bumps a global sequence number and stamps the touched
/// file with it, so tests can assert access order.
#[derive(Debug, Default)]
pub struct MockFilesystem {
    state: Mutex<MockState>,
}

impl MockFilesystem {
    /// A filesystem containing the given, empty, files.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fs = Self::default();
        for path in paths {
            fs.add(path);
        }
        fs
    }

    pub fn add(&self, path: impl Into<String>) {
        self.state.lock().files.entry(path.into()).or_default();
    }

    pub fn remove(&self, path: &str) {
        self.state.lock().files.remove(path);
    }

    pub fn set_contents(&self, path: &str, contents: impl Into<String>) {
        self.state
            .lock()
            .files
            .entry(path.to_string())
            .or_default()
            .contents = contents.into();
    }

    pub fn contents(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).map(|f| f.contents.clone())
    }

    /// Sequence number of the last access to `path` (0 = never touched).
    pub fn seq(&self, path: &str) -> u64 {
        self.state.lock().files.get(path).map_or(0, |f| f.seq)
    }

    pub fn set_read_error(&self, enabled: bool) {
        self.state.lock().with_read_error = enabled;
    }

    pub fn set_write_error(&self, enabled: bool) {
        self.state.lock().with_write_error = enabled;
    }
}

impl Filesystem for MockFilesystem {
    fn read_file(&self, path: &str, max_len: usize) -> Result<Vec<u8>, FerroError> {
        let mut state = self.state.lock();
        if !state.files.contains_key(path) {
            return Err(FerroError::io(path, "no such file"));
        }
        if state.with_read_error {
            return Err(FerroError::io(path, "read error"));
        }
        state.seq += 1;
        let seq = state.seq;
        let file = state
            .files
            .get_mut(path)
            .ok_or_else(|| FerroError::io(path, "no such file"))?;
        file.seq = seq;
        let bytes = file.contents.as_bytes();
        Ok(bytes[..bytes.len().min(max_len)].to_vec())
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FerroError> {
        let mut state = self.state.lock();
        if !state.files.contains_key(path) {
            return Err(FerroError::io(path, "no such file"));
        }
        if state.with_write_error {
            return Err(FerroError::io(path, "write error"));
        }
        state.seq += 1;
        let seq = state.seq;
        let file = state
            .files
            .get_mut(path)
            .ok_or_else(|| FerroError::io(path, "no such file"))?;
        file.contents = String::from_utf8_lossy(data).into_owned();
        file.seq = seq;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let state = self.state.lock();
        let dir = format!("{path}/");
        state.files.contains_key(path) || state.files.keys().any(|p| p.starts_with(&dir))
    }
}
