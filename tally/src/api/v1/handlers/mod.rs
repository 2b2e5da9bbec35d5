pub(crate) mod commands;
pub(crate) mod health;

pub use commands::handle_command;
pub use health::health_check;
