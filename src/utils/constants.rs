pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB
pub const HISTORY_LIMIT: usize = 20;

// base64 inflates by 4/3, leave room for the JSON envelope
pub const SERVER_REQUEST_BODY_LIMIT: usize = 16 * 1024 * 1024;

pub const ACCEPTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

pub const DEFAULT_STYLE: &str = "default";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 30;
