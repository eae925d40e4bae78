mod command;

pub use command::{CommandBuffer, CommandProcessor, PendingCommand};
