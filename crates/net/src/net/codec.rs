/// An opaque payload exchanged over the data channel. The network layer never looks inside.
pub trait Message: Send + Sync {
    fn bytes(&self) -> &[u8];
    fn set_bytes(&mut self, bytes: &[u8]);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Message for RawMessage {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn set_bytes(&mut self, bytes: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(bytes);
    }
}

impl From<Vec<u8>> for RawMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

pub fn encode_datagram(payload: &[u8], packet_length: usize) -> Vec<u8> {
    let mut frame = vec![0u8; packet_length];
    let n = payload.len().min(packet_length);
    frame[..n].copy_from_slice(&payload[..n]);
    frame
}

pub fn decode_datagram(received: &[u8], packet_length: usize, message: &mut dyn Message) {
    if received.len() == packet_length {
        message.set_bytes(received);
    } else {
        message.set_bytes(&encode_datagram(received, packet_length));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payload_is_zero_padded() {
        let frame = encode_datagram(&[0, 1, 2, 3], 1024);
        assert_eq!(frame.len(), 1024);
        assert_eq!(&frame[..4], &[0, 1, 2, 3]);
        assert!(frame[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn long_payload_is_truncated() {
        let payload: Vec<u8> = (0..20).collect();
        let frame = encode_datagram(&payload, 8);
        assert_eq!(frame, (0..8).collect::<Vec<u8>>());
    }

    #[test]
    fn payload_prefix_survives_framing() {
        let payload = b"snake moved left".to_vec();
        let frame = encode_datagram(&payload, 64);

        let mut message = RawMessage::default();
        decode_datagram(&frame, 64, &mut message);

        assert_eq!(message.len(), 64);
        assert_eq!(&message.bytes()[..payload.len()], payload.as_slice());
    }

    #[test]
    fn short_datagram_is_padded_on_decode() {
        let mut message = RawMessage::new(vec![9; 3]);
        decode_datagram(&[7, 7], 4, &mut message);
        assert_eq!(message.bytes(), &[7, 7, 0, 0]);
    }
}
