/// Application name
pub const APP_NAME: &str = "haccp-capture";

/// File name of the persisted upload queue inside the data directory
pub const QUEUE_FILE_NAME: &str = "image_queue.json";

/// Sub-directory holding compressed captures
pub const CAPTURE_DIR_NAME: &str = "captures";

/// Reachability probe timeout in seconds
pub const PROBE_TIMEOUT_SECS: u64 = 3;

/// Reachability polling interval in seconds
pub const POLL_INTERVAL_SECS: u64 = 30;

/// Timeout applied to each upload and each field update, in seconds
pub const CALL_TIMEOUT_SECS: u64 = 30;

/// Upper bound on the wall-clock length of one drain, in seconds
pub const DRAIN_DEADLINE_SECS: u64 = 300;

/// Failed attempts after which an item stops being retried automatically
pub const MAX_ATTEMPTS: u32 = 8;

/// Longest edge of a compressed capture, in pixels
pub const MAX_IMAGE_EDGE: u32 = 1280;

/// JPEG quality used when re-encoding captures
pub const JPEG_QUALITY: u8 = 70;

/// Default local agent API port
pub const DEFAULT_HTTP_PORT: u16 = 8765;
