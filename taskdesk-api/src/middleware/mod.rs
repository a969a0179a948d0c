/// Middleware modules for the API server
///
/// - `security`: browser hardening headers
/// - `session`: bearer token extraction and session resolution

pub mod security;
pub mod session;
