use jaxnet::{CommandProcessor, Message, RawMessage};

/// Treats the most recent inbound message as the whole game state and hands it back on
/// every tick, so every peer sees what the last sender wrote.
#[derive(Debug, Default)]
pub struct RelayProcessor {
    state: RawMessage,
    executed: u64,
}

impl RelayProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn reset(&mut self) {
        self.state = RawMessage::default();
    }
}

impl CommandProcessor for RelayProcessor {
    fn execute(&mut self, message: &dyn Message) {
        self.state.set_bytes(message.bytes());
        self.executed += 1;
    }

    fn result(&self) -> RawMessage {
        self.state.clone()
    }
}
