//! Process-wide constants.

use std::time::Duration;

/// Tag attached to every task submitted by this service.
pub const PT_TAG: &str = "HS";

/// Prefix of the single-use correlation tag used to recover task ids.
pub const CORRELATION_TAG_PREFIX: &str = "HS";

/// Number of random characters appended to the correlation tag prefix.
pub const CORRELATION_TAG_LEN: usize = 5;

/// Default User-Agent for payload downloads.
pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/98.0.4758.102 Safari/537.36";

/// Reserved id of the implicit default download setting.
pub const DEFAULT_SETTING_ID: &str = "-1";

/// Display name of the implicit default download setting.
pub const DEFAULT_SETTING_NAME: &str = "Default";

/// Sentinel setting id meaning "caller-supplied values only".
pub const BYPASS_SETTING_ID: &str = "-2";

/// Interval between two runs of a backend's transfer job.
pub const TRANSFER_INTERVAL: Duration = Duration::from_secs(300);

/// Extension of configuration documents.
pub const CONFIG_EXTENSION: &str = "yaml";

/// Environment variable holding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "HUBSTATION_CONFIG";

/// Environment variable holding the log directory.
pub const LOG_DIR_ENV: &str = "HUBSTATION_LOG";
