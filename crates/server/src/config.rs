use jaxnet::NetConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub net: NetConfig,
    pub command_buffer_size: usize,
    /// Depth of the inbound datagram queue between the receive task and the tick loop.
    pub inbound_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            net: NetConfig::default(),
            command_buffer_size: 256,
            inbound_queue_size: 1024,
        }
    }
}
