//! Network-related constants.

/// Default port for the tenantd API server.
pub const DEFAULT_API_PORT: u16 = 8443;

/// Default bearer token accepted by the API when none is configured.
pub const DEFAULT_API_TOKEN: &str = "demo-token-123";
