/// Application name, used for state directories and env var prefixes.
pub const APP_NAME: &str = "chromaforge";

/// Length of the truncated digest used to stamp revisions.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Directory (relative to the workspace root) holding orchestrator state.
pub const STATE_DIR_NAME: &str = ".chromaforge";

/// Marker file written into every synced directory, holding its pin.
pub const PIN_MARKER: &str = ".chromaforge-pin";

/// Number of trailing log lines kept in a build result.
pub const LOG_TAIL_LINES: usize = 200;
