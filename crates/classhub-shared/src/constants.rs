/// Application name
pub const APP_NAME: &str = "ClassHub";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Maximum accepted material size in bytes (25 MiB)
pub const MAX_UPLOAD_SIZE: usize = 25 * 1024 * 1024;

/// MIME type recorded when the client does not declare one
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// Request header carrying the authenticated caller, set by the upstream
/// authentication gateway.
pub const CALLER_HEADER: &str = "x-user-id";

/// Maximum length of a caller identifier
pub const MAX_USER_ID_LEN: usize = 128;
