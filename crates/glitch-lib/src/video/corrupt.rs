use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Upper bound of corruption events per packet.
pub const MAX_EVENTS: usize = 6;
/// Upper bound of overwritten bytes per event.
pub const MAX_RUN: usize = 256;

/// The random draws a corruption pass consumes, one method per draw.
pub trait CorruptionSource {
    /// Number of events, in `1..=MAX_EVENTS`.
    fn event_count(&mut self) -> usize;
    /// Start offset of a run, in `0..len`.
    fn offset(&mut self, len: usize) -> usize;
    /// Run length, in `1..=MAX_RUN`.
    fn run_length(&mut self) -> usize;
    fn byte(&mut self) -> u8;
}

impl<R: Rng> CorruptionSource for R {
    fn event_count(&mut self) -> usize {
        self.random_range(1..=MAX_EVENTS)
    }

    fn offset(&mut self, len: usize) -> usize {
        self.random_range(0..len)
    }

    fn run_length(&mut self) -> usize {
        self.random_range(1..=MAX_RUN)
    }

    fn byte(&mut self) -> u8 {
        self.random::<u8>()
    }
}

/// Overwrites random runs of compressed packet bytes with random values.
///
/// Each enabled call draws, in this order: an event count, then per event a
/// start offset, a run length and one value per byte of the run (clipped to
/// the packet end). The draw order is part of the contract so a seeded
/// generator reproduces a mutation exactly.
pub struct PacketCorruptor<S = StdRng> {
    source: S,
}

impl PacketCorruptor<StdRng> {
    /// Seeded once from OS entropy.
    pub fn from_entropy() -> Self {
        Self::with_source(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_source(StdRng::seed_from_u64(seed))
    }
}

impl<S: CorruptionSource> PacketCorruptor<S> {
    pub fn with_source(source: S) -> Self {
        Self { source }
    }

    /// Corrupts `data` in place when `enabled`. Returns the number of bytes written.
    pub fn corrupt(&mut self, data: &mut [u8], enabled: bool) -> usize {
        if !enabled || data.is_empty() {
            return 0;
        }

        let len = data.len();
        let events = self.source.event_count();
        let mut written = 0;
        for _ in 0..events {
            let start = self.source.offset(len);
            let run = self.source.run_length();
            let end = (start + run).min(len);
            for byte in &mut data[start..end] {
                *byte = self.source.byte();
            }
            written += end - start;
        }
        log::trace!("Corrupted {} bytes in {} events", written, events);
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_is_a_no_op() {
        let mut corruptor = PacketCorruptor::seeded(7);
        let original: Vec<u8> = (0..=255).collect();
        let mut data = original.clone();

        for _ in 0..32 {
            assert_eq!(corruptor.corrupt(&mut data, false), 0);
        }
        assert_eq!(data, original);
    }

    #[test]
    fn empty_packet_is_never_touched() {
        let mut corruptor = PacketCorruptor::seeded(7);
        let mut data: Vec<u8> = Vec::new();
        assert_eq!(corruptor.corrupt(&mut data, true), 0);
    }

    #[test]
    fn writes_stay_inside_the_packet() {
        let mut corruptor = PacketCorruptor::seeded(42);
        for len in [1usize, 2, 17, 255, 256, 257, 4096] {
            for _ in 0..64 {
                // Guard bytes either side of the packet must survive.
                let mut buffer = vec![0xAAu8; len + 64];
                let (head, rest) = buffer.split_at_mut(32);
                let (packet, tail) = rest.split_at_mut(len);

                let written = corruptor.corrupt(packet, true);
                assert!(written >= 1, "len {} wrote nothing", len);
                assert!(written <= MAX_EVENTS * MAX_RUN);
                assert!(head.iter().all(|b| *b == 0xAA));
                assert!(tail.iter().all(|b| *b == 0xAA));
            }
        }
    }

    #[test]
    fn enabled_changes_packet_contents() {
        let mut corruptor = PacketCorruptor::seeded(1234);
        let original = vec![0u8; 4096];
        let mut data = original.clone();
        corruptor.corrupt(&mut data, true);
        assert_ne!(data, original);
    }

    /// Replays fixed draws and records what was asked for, in order.
    struct ScriptedSource {
        events: usize,
        spans: Vec<(usize, usize)>,
        next_byte: u8,
        calls: Vec<String>,
    }

    impl CorruptionSource for ScriptedSource {
        fn event_count(&mut self) -> usize {
            self.calls.push("events".to_string());
            self.events
        }

        fn offset(&mut self, len: usize) -> usize {
            self.calls.push(format!("offset<{}", len));
            self.spans[0].0
        }

        fn run_length(&mut self) -> usize {
            self.calls.push("run".to_string());
            self.spans.remove(0).1
        }

        fn byte(&mut self) -> u8 {
            self.calls.push("byte".to_string());
            self.next_byte += 1;
            self.next_byte
        }
    }

    #[test]
    fn draws_follow_the_documented_order() {
        let source = ScriptedSource {
            events: 2,
            spans: vec![(2, 3), (8, 256)],
            next_byte: 0,
            calls: Vec::new(),
        };
        let mut corruptor = PacketCorruptor::with_source(source);
        let mut data = [0u8; 10];

        assert_eq!(corruptor.corrupt(&mut data, true), 5);
        assert_eq!(data, [0, 0, 1, 2, 3, 0, 0, 0, 4, 5]);
        assert_eq!(
            corruptor.source.calls,
            [
                "events", "offset<10", "run", "byte", "byte", "byte", "offset<10", "run", "byte",
                "byte",
            ]
        );
    }

    #[test]
    fn seeded_draws_cover_their_full_ranges() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut events_seen = [false; MAX_EVENTS + 1];
        let mut offsets_seen = [false; 3];
        let (mut shortest, mut longest) = (usize::MAX, 0);

        for _ in 0..20_000 {
            let events = rng.event_count();
            assert!((1..=MAX_EVENTS).contains(&events));
            events_seen[events] = true;

            let offset = rng.offset(3);
            assert!(offset < 3);
            offsets_seen[offset] = true;

            let run = rng.run_length();
            assert!((1..=MAX_RUN).contains(&run));
            shortest = shortest.min(run);
            longest = longest.max(run);
        }

        assert!(events_seen[1..].iter().all(|seen| *seen));
        assert!(offsets_seen.iter().all(|seen| *seen));
        assert_eq!((shortest, longest), (1, MAX_RUN));
    }

    #[test]
    fn same_seed_reproduces_the_mutation() {
        let original: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let mut first = original.clone();
        let written = PacketCorruptor::seeded(0x5eed).corrupt(&mut first, true);
        let mut second = original.clone();
        PacketCorruptor::seeded(0x5eed).corrupt(&mut second, true);
        let mut other = original.clone();
        PacketCorruptor::seeded(0x5eee).corrupt(&mut other, true);

        assert!(written > 0);
        assert_eq!(first, second);
        assert_ne!(first, original);
        assert_ne!(first, other);
    }
}
