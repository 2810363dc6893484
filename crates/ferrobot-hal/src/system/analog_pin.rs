use std::sync::Arc;

use ferrobot_types::FerroError;

use super::Filesystem;

/// Where an analog pin lives in sysfs and what it may be used for. Produced
/// by a platform translator from a pin identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalogPinConfig {
    pub path: String,
    pub readable: bool,
    pub writable: bool,
    /// Maximum bytes read per access.
    pub buffer_length: u16,
}

/// One sysfs attribute holding an integer (ADC channel, PWM period, …).
pub struct SysfsAnalogPin {
    config: AnalogPinConfig,
    fs: Arc<dyn Filesystem>,
}

impl SysfsAnalogPin {
    pub fn new(fs: Arc<dyn Filesystem>, config: AnalogPinConfig) -> Self {
        Self { config, fs }
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    /// Read the first line of the attribute as an integer. An empty file
    /// reads as `0`.
    ///
    /// # Errors
    ///
    /// * [`FerroError::Config`] if the pin is not readable.
    /// * [`FerroError::Io`] on a filesystem error.
    /// * [`FerroError::Protocol`] if the contents are not an integer.
    pub fn read(&self) -> Result<i32, FerroError> {
        if !self.config.readable {
            return Err(FerroError::Config(format!(
                "the pin '{}' is not allowed to read",
                self.config.path
            )));
        }
        let buf = self
            .fs
            .read_file(&self.config.path, usize::from(self.config.buffer_length))?;
        let text = String::from_utf8_lossy(&buf);
        let first = text.lines().next().unwrap_or("").trim();
        if first.is_empty() {
            return Ok(0);
        }
        first.parse().map_err(|e| {
            FerroError::Protocol(format!("'{}' holds '{first}': {e}", self.config.path))
        })
    }

    /// Write `value` as decimal text.
    ///
    /// # Errors
    ///
    /// * [`FerroError::Config`] if the pin is not writable.
    /// * [`FerroError::Io`] on a filesystem error.
    pub fn write(&self, value: i32) -> Result<(), FerroError> {
        if !self.config.writable {
            return Err(FerroError::Config(format!(
                "the pin '{}' is not allowed to write (val: {value})",
                self.config.path
            )));
        }
        self.fs.write_file(&self.config.path, value.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockFilesystem;

    fn pin(fs: &Arc<MockFilesystem>, path: &str, readable: bool, writable: bool, len: u16) -> SysfsAnalogPin {
        SysfsAnalogPin::new(
            Arc::clone(fs) as Arc<dyn Filesystem>,
            AnalogPinConfig {
                path: path.to_string(),
                readable,
                writable,
                buffer_length: len,
            },
        )
    }

    #[test]
    fn reads_first_line_as_integer() {
        let fs = Arc::new(MockFilesystem::new(["/sys/testread"]));
        fs.set_contents("/sys/testread", "32\n");
        assert_eq!(pin(&fs, "/sys/testread", true, false, 10).read().unwrap(), 32);
    }

    #[test]
    fn read_respects_buffer_length() {
        let fs = Arc::new(MockFilesystem::new(["/sys/testread"]));
        fs.set_contents("/sys/testread", "54321");
        assert_eq!(pin(&fs, "/sys/testread", true, false, 2).read().unwrap(), 54);
    }

    #[test]
    fn read_not_allowed() {
        let fs = Arc::new(MockFilesystem::new(["/sys/testread"]));
        let err = pin(&fs, "/sys/testread", false, false, 2).read().unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: the pin '/sys/testread' is not allowed to read"
        );
    }

    #[test]
    fn write_and_write_not_allowed() {
        let fs = Arc::new(MockFilesystem::new(["/sys/testwrite"]));
        fs.set_contents("/sys/testwrite", "old_value");
        let err = pin(&fs, "/sys/testwrite", false, false, 10).write(23).unwrap_err();
        assert!(err.to_string().contains("is not allowed to write (val: 23)"));
        assert_eq!(fs.contents("/sys/testwrite").as_deref(), Some("old_value"));

        pin(&fs, "/sys/testwrite", false, true, 10).write(23).unwrap();
        assert_eq!(fs.contents("/sys/testwrite").as_deref(), Some("23"));
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let fs = Arc::new(MockFilesystem::new(["/sys/p"]));
        fs.set_contents("/sys/p", "inverted");
        let err = pin(&fs, "/sys/p", true, true, 13).read().unwrap_err();
        assert!(matches!(err, FerroError::Protocol(_)));
    }
}
