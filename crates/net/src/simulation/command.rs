use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::net::{Message, RawMessage};

/// Owns the authoritative game state. Never touches the network.
pub trait CommandProcessor: Send {
    fn execute(&mut self, message: &dyn Message);

    fn result(&self) -> RawMessage;
}

impl<P: CommandProcessor + ?Sized> CommandProcessor for Box<P> {
    fn execute(&mut self, message: &dyn Message) {
        (**self).execute(message);
    }

    fn result(&self) -> RawMessage {
        (**self).result()
    }
}

#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub sender: SocketAddr,
    pub message: RawMessage,
}

/// When full the oldest message is dropped.
#[derive(Debug)]
pub struct CommandBuffer {
    commands: VecDeque<PendingCommand>,
    max_size: usize,
    dropped: u64,
}

impl CommandBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            commands: VecDeque::with_capacity(max_size),
            max_size,
            dropped: 0,
        }
    }

    pub fn push(&mut self, sender: SocketAddr, message: RawMessage) {
        if self.commands.len() >= self.max_size {
            self.commands.pop_front();
            self.dropped += 1;
        }
        self.commands.push_back(PendingCommand { sender, message });
    }

    pub fn apply(&mut self, processor: &mut dyn CommandProcessor) -> usize {
        let count = self.commands.len();
        for pending in self.commands.drain(..) {
            processor.execute(&pending.message);
        }
        count
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
