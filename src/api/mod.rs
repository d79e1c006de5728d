// FFI surface exposed to the Flutter app through flutter_rust_bridge.

pub mod media_api;
pub mod simple;
