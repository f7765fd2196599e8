pub mod config_cmd;
pub mod cookie_cmd;
pub mod notify;
pub mod output;
pub mod renderer;
pub mod usage_cmd;
pub mod watch_cmd;
