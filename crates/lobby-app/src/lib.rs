// Library root for the lobby client shell: configuration, websocket
// transport, HTTP avatar lookup, and the console front end.

pub mod avatar_http;
pub mod commands;
pub mod config;
pub mod render;
pub mod transport;
