//! In-memory transport for end-to-end tests. Frames travel between the
//! Server and its Clients through one shared hub, without any network I/O.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use log::trace;

use netrep_shared::{BitReader, MessageType, PeerId, Serde, Transport, TransportError};

/// Degrades unreliable frames the way a lossy link would. Reliable frames
/// are never dropped. Every link stays FIFO, so a held back frame also holds
/// back whatever was sent after it.
#[derive(Clone, Copy, Debug)]
pub struct LinkConditionerConfig {
    /// Chance in `0.0..=1.0` that an unreliable frame is lost
    pub drop_rate: f32,
    /// Most rounds an unreliable frame may be held back
    pub max_delay_rounds: u32,
    pub seed: u64,
}

impl LinkConditionerConfig {
    pub fn new(drop_rate: f32, max_delay_rounds: u32, seed: u64) -> Self {
        Self {
            drop_rate,
            max_delay_rounds,
            seed,
        }
    }

    /// A link that holds frames back but never loses them
    pub fn jitter(max_delay_rounds: u32, seed: u64) -> Self {
        Self::new(0.0, max_delay_rounds, seed)
    }
}

struct QueuedFrame {
    deliver_at: u64,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct Link {
    queue: VecDeque<QueuedFrame>,
    last_deliver_at: u64,
}

fn header_type(bytes: &[u8]) -> Option<MessageType> {
    let mut reader = BitReader::new(bytes);
    MessageType::from_byte(u8::de(&mut reader).ok()?).ok()
}

struct HubState {
    round: u64,
    links: BTreeMap<(PeerId, PeerId), Link>,
    closed: BTreeSet<(PeerId, PeerId)>,
    disconnects: Vec<(PeerId, PeerId)>,
    sent: Vec<(PeerId, PeerId, MessageType)>,
    conditioner: Option<(LinkConditionerConfig, fastrand::Rng)>,
}

impl HubState {
    fn enqueue(&mut self, from: PeerId, to: PeerId, bytes: &[u8], reliable: bool) {
        if let Some(message_type) = header_type(bytes) {
            self.sent.push((from, to, message_type));
        }

        let mut delay = 0;
        if !reliable {
            if let Some((config, rng)) = self.conditioner.as_mut() {
                if rng.f32() < config.drop_rate {
                    trace!("link conditioner dropped a frame from {:?} to {:?}", from, to);
                    return;
                }
                delay = rng.u32(0..=config.max_delay_rounds) as u64;
            }
        }

        let round = self.round;
        let link = self.links.entry((from, to)).or_default();
        // never overtake an earlier frame on the same link
        let deliver_at = (round + delay).max(link.last_deliver_at);
        link.last_deliver_at = deliver_at;
        link.queue.push_back(QueuedFrame {
            deliver_at,
            bytes: bytes.to_vec(),
        });
    }
}

/// Routes frames between every peer of one test session
#[derive(Clone)]
pub struct LocalTransportHub {
    state: Arc<Mutex<HubState>>,
}

impl Default for LocalTransportHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTransportHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                round: 0,
                links: BTreeMap::new(),
                closed: BTreeSet::new(),
                disconnects: Vec::new(),
                sent: Vec::new(),
                conditioner: None,
            })),
        }
    }

    pub fn with_conditioner(config: LinkConditionerConfig) -> Self {
        let hub = Self::new();
        hub.lock().conditioner = Some((config, fastrand::Rng::with_seed(config.seed)));
        hub
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A transport which sends as `owner`
    pub fn transport(&self, owner: PeerId) -> LocalTransport {
        LocalTransport {
            owner,
            hub: self.clone(),
        }
    }

    /// Opens both directions of the link between `a` and `b`
    pub fn open(&self, a: PeerId, b: PeerId) {
        let mut state = self.lock();
        state.closed.remove(&(a, b));
        state.closed.remove(&(b, a));
    }

    /// Closes both directions. Frames already queued are still delivered.
    pub fn close(&self, a: PeerId, b: PeerId) {
        let mut state = self.lock();
        state.closed.insert((a, b));
        state.closed.insert((b, a));
    }

    pub fn is_open(&self, a: PeerId, b: PeerId) -> bool {
        !self.lock().closed.contains(&(a, b))
    }

    /// Moves the delivery clock forward by one round
    pub fn next_round(&self) {
        self.lock().round += 1;
    }

    /// Takes every frame addressed to `to` that is due this round, per link
    /// in send order
    pub fn deliver(&self, to: PeerId) -> Vec<(PeerId, Vec<u8>)> {
        let mut state = self.lock();
        let round = state.round;
        let mut output = Vec::new();
        for ((from, link_to), link) in state.links.iter_mut() {
            if *link_to != to {
                continue;
            }
            while link
                .queue
                .front()
                .map_or(false, |frame| frame.deliver_at <= round)
            {
                if let Some(frame) = link.queue.pop_front() {
                    output.push((*from, frame.bytes));
                }
            }
        }
        output
    }

    /// Frames still held back on any link
    pub fn in_flight(&self) -> usize {
        self.lock().links.values().map(|link| link.queue.len()).sum()
    }

    /// Disconnects requested through a transport since the last call, as
    /// `(initiator, peer)`
    pub fn take_disconnects(&self) -> Vec<(PeerId, PeerId)> {
        std::mem::take(&mut self.lock().disconnects)
    }

    /// Every frame type `from` has sent to `to`, including dropped ones
    pub fn sent_frames(&self, from: PeerId, to: PeerId) -> Vec<MessageType> {
        self.lock()
            .sent
            .iter()
            .filter(|(sender, recipient, _)| *sender == from && *recipient == to)
            .map(|(_, _, message_type)| *message_type)
            .collect()
    }

    /// How many frames of `message_type` `from` has sent to anyone
    pub fn count_sent(&self, from: PeerId, message_type: MessageType) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|(sender, _, sent_type)| *sender == from && *sent_type == message_type)
            .count()
    }

    pub fn clear_sent_log(&self) {
        self.lock().sent.clear();
    }
}

/// One peer's end of the hub
pub struct LocalTransport {
    owner: PeerId,
    hub: LocalTransportHub,
}

impl LocalTransport {
    pub fn owner(&self) -> PeerId {
        self.owner
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, peer: PeerId, payload: &[u8], reliable: bool) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        if state.closed.contains(&(self.owner, peer)) {
            return Err(TransportError::NotConnected { peer });
        }
        state.enqueue(self.owner, peer, payload, reliable);
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId) {
        let mut state = self.hub.lock();
        state.closed.insert((self.owner, peer));
        state.closed.insert((peer, self.owner));
        state.disconnects.push((self.owner, peer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: PeerId = PeerId::new(1);

    #[test]
    fn frames_arrive_in_send_order() {
        let hub = LocalTransportHub::new();
        let mut transport = hub.transport(PeerId::SERVER);
        transport.send(CLIENT, &[1], true).unwrap();
        transport.send(CLIENT, &[2], false).unwrap();

        let delivered: Vec<Vec<u8>> = hub.deliver(CLIENT).into_iter().map(|(_, bytes)| bytes).collect();
        assert_eq!(delivered, vec![vec![1], vec![2]]);
        assert!(hub.deliver(CLIENT).is_empty());
    }

    #[test]
    fn jitter_never_reorders_a_link() {
        let hub = LocalTransportHub::with_conditioner(LinkConditionerConfig::jitter(4, 7));
        let mut transport = hub.transport(PeerId::SERVER);
        for index in 0..32u8 {
            transport.send(CLIENT, &[index], index % 3 == 0).unwrap();
            hub.next_round();
        }
        for _ in 0..8 {
            hub.next_round();
        }

        let delivered: Vec<u8> = hub.deliver(CLIENT).into_iter().map(|(_, bytes)| bytes[0]).collect();
        assert_eq!(delivered, (0..32u8).collect::<Vec<_>>());
    }

    #[test]
    fn closed_links_refuse_sends() {
        let hub = LocalTransportHub::new();
        let mut transport = hub.transport(PeerId::SERVER);
        transport.disconnect(CLIENT);

        assert_eq!(
            transport.send(CLIENT, &[1], true),
            Err(TransportError::NotConnected { peer: CLIENT })
        );
        assert_eq!(hub.take_disconnects(), vec![(PeerId::SERVER, CLIENT)]);
    }
}
