pub mod device_api;
pub mod monitor_ws;
pub mod terminal;
