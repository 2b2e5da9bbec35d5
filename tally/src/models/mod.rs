mod command;
mod context;
mod conversation;
mod payment;

pub use command::*;
pub use context::*;
pub use conversation::*;
pub use payment::*;
