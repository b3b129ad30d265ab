// UALINK MODEL — DL ERROR INJECTION
// Fault injection on the transmit path for negative testing: CRC corruption,
// packet drops, and sequence-number mutation, driven by a pluggable policy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dl::flit::DlFlit;
use crate::dl::wrap_seq;

/// What to do to the next outgoing flit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    None,
    CrcCorruption,
    PacketDrop,
    SequenceDup,
    SequenceSkip,
}

/// Policy hook: one decision per serialized flit.
pub type ErrorPolicyFn = Box<dyn FnMut() -> ErrorKind>;

/// Error injector over the tx serialize path.
pub struct ErrorInjector {
    enabled: bool,
    policy: Option<ErrorPolicyFn>,
    last_seq: u16,
}

impl ErrorInjector {
    pub fn new() -> Self {
        ErrorInjector {
            enabled: false,
            policy: None,
            last_seq: 0,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_policy(&mut self, policy: impl FnMut() -> ErrorKind + 'static) {
        self.policy = Some(Box::new(policy));
    }

    /// Draw the next decision from the policy. Disabled or policy-less
    /// injectors never inject.
    pub fn next_error(&mut self) -> ErrorKind {
        if !self.enabled {
            return ErrorKind::None;
        }
        match self.policy.as_mut() {
            Some(policy) => policy(),
            None => ErrorKind::None,
        }
    }

    /// Consult the policy for a drop decision. Consumes one policy draw.
    pub fn should_drop(&mut self) -> bool {
        self.next_error() == ErrorKind::PacketDrop
    }

    /// Apply a fault to a copy of the flit. CRC corruption XORs two bytes of
    /// the CRC field so the covered region no longer matches.
    pub fn apply(&self, flit: &DlFlit, error: ErrorKind) -> DlFlit {
        let mut corrupted = *flit;
        if error == ErrorKind::CrcCorruption {
            corrupted.crc[0] ^= 0xFF;
            corrupted.crc[1] ^= 0xFF;
        }
        corrupted
    }

    /// Rewrite an outgoing sequence number per the fault kind. Duplication
    /// replays the previously recorded sequence; skip jumps one ahead.
    pub fn modify_sequence(&mut self, seq_no: u16, error: ErrorKind) -> u16 {
        match error {
            ErrorKind::SequenceDup => self.last_seq,
            ErrorKind::SequenceSkip => {
                self.last_seq = seq_no;
                wrap_seq(seq_no)
            }
            _ => {
                self.last_seq = seq_no;
                seq_no
            }
        }
    }
}

impl Default for ErrorInjector {
    fn default() -> Self {
        ErrorInjector::new()
    }
}

// ============================================================================
// BUILT-IN POLICIES
// ============================================================================

/// Returns the chosen error every `period`-th call.
pub struct PeriodicErrorPolicy {
    period: usize,
    counter: usize,
    kind: ErrorKind,
}

impl PeriodicErrorPolicy {
    pub fn new(period: usize, kind: ErrorKind) -> Self {
        PeriodicErrorPolicy {
            period,
            counter: 0,
            kind,
        }
    }

    pub fn next(&mut self) -> ErrorKind {
        self.counter += 1;
        if self.counter % self.period == 0 {
            self.kind
        } else {
            ErrorKind::None
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

/// Returns the chosen error for calls in [start, start + length).
pub struct BurstErrorPolicy {
    burst_start: usize,
    burst_length: usize,
    counter: usize,
    kind: ErrorKind,
}

impl BurstErrorPolicy {
    pub fn new(burst_start: usize, burst_length: usize, kind: ErrorKind) -> Self {
        BurstErrorPolicy {
            burst_start,
            burst_length,
            counter: 0,
            kind,
        }
    }

    pub fn next(&mut self) -> ErrorKind {
        self.counter += 1;
        if self.counter >= self.burst_start && self.counter < self.burst_start + self.burst_length
        {
            self.kind
        } else {
            ErrorKind::None
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

/// Independent Bernoulli trials per error class, checked in order: CRC
/// corruption, packet drop, sequence error (dup or skip, evenly split).
pub struct RandomErrorPolicy {
    rng: StdRng,
    crc_corruption_prob: f64,
    packet_drop_prob: f64,
    sequence_error_prob: f64,
}

impl RandomErrorPolicy {
    /// All three classes share `error_probability`; seeded from the OS.
    pub fn new(error_probability: f64) -> Self {
        RandomErrorPolicy {
            rng: StdRng::from_entropy(),
            crc_corruption_prob: error_probability,
            packet_drop_prob: error_probability,
            sequence_error_prob: error_probability,
        }
    }

    /// Deterministic variant for reproducible runs.
    pub fn with_seed(seed: u64, error_probability: f64) -> Self {
        RandomErrorPolicy {
            rng: StdRng::seed_from_u64(seed),
            crc_corruption_prob: error_probability,
            packet_drop_prob: error_probability,
            sequence_error_prob: error_probability,
        }
    }

    pub fn set_crc_corruption_probability(&mut self, prob: f64) {
        self.crc_corruption_prob = prob;
    }

    pub fn set_packet_drop_probability(&mut self, prob: f64) {
        self.packet_drop_prob = prob;
    }

    pub fn set_sequence_error_probability(&mut self, prob: f64) {
        self.sequence_error_prob = prob;
    }

    pub fn next(&mut self) -> ErrorKind {
        if self.rng.gen::<f64>() < self.crc_corruption_prob {
            return ErrorKind::CrcCorruption;
        }
        if self.rng.gen::<f64>() < self.packet_drop_prob {
            return ErrorKind::PacketDrop;
        }
        if self.rng.gen::<f64>() < self.sequence_error_prob {
            return if self.rng.gen::<f64>() < 0.5 {
                ErrorKind::SequenceDup
            } else {
                ErrorKind::SequenceSkip
            };
        }
        ErrorKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dl::flit::{pack_flit, pack_flit_with_injection, ExplicitFlitHeader, TlFlit};
    use crate::dl::flit::unpack_flit_checked;

    fn header(seq: u16) -> ExplicitFlitHeader {
        ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: seq,
        }
    }

    #[test]
    fn disabled_injector_is_inert() {
        let mut injector = ErrorInjector::new();
        injector.set_policy(|| ErrorKind::CrcCorruption);
        assert_eq!(injector.next_error(), ErrorKind::None);
        injector.enable();
        assert_eq!(injector.next_error(), ErrorKind::CrcCorruption);
        injector.disable();
        assert!(!injector.should_drop());
    }

    #[test]
    fn crc_corruption_rejects_receive() {
        let mut injector = ErrorInjector::new();
        injector.enable();
        injector.set_policy(|| ErrorKind::CrcCorruption);

        let tl = TlFlit::new([0x5A; 64], 0);
        let (flit, packed) = pack_flit_with_injection(&[tl], &header(1), &mut injector).unwrap();
        assert_eq!(packed, 1);
        assert!(unpack_flit_checked(&flit).is_none());
    }

    #[test]
    fn packet_drop_yields_empty_flit() {
        let mut injector = ErrorInjector::new();
        injector.enable();
        injector.set_policy(|| ErrorKind::PacketDrop);

        let tl = TlFlit::new([1; 64], 0);
        let (_, packed) = pack_flit_with_injection(&[tl], &header(1), &mut injector).unwrap();
        assert_eq!(packed, 0);
    }

    #[test]
    fn no_error_leaves_flit_intact() {
        let mut injector = ErrorInjector::new();
        injector.enable();
        injector.set_policy(|| ErrorKind::None);

        let tl = TlFlit::new([7; 64], 1);
        let (flit, packed) = pack_flit_with_injection(&[tl], &header(2), &mut injector).unwrap();
        let (clean, _) = pack_flit(&[tl], &header(2)).unwrap();
        assert_eq!(packed, 1);
        assert_eq!(flit, clean);
    }

    #[test]
    fn sequence_mutation() {
        let mut injector = ErrorInjector::new();
        assert_eq!(injector.modify_sequence(5, ErrorKind::None), 5);
        assert_eq!(injector.modify_sequence(6, ErrorKind::SequenceDup), 5);
        assert_eq!(injector.modify_sequence(6, ErrorKind::SequenceSkip), 7);
        // Skip from the top of the ring wraps to 1.
        assert_eq!(injector.modify_sequence(511, ErrorKind::SequenceSkip), 1);
    }

    #[test]
    fn periodic_policy_fires_every_n() {
        let mut policy = PeriodicErrorPolicy::new(3, ErrorKind::PacketDrop);
        let draws: Vec<ErrorKind> = (0..6).map(|_| policy.next()).collect();
        assert_eq!(
            draws,
            vec![
                ErrorKind::None,
                ErrorKind::None,
                ErrorKind::PacketDrop,
                ErrorKind::None,
                ErrorKind::None,
                ErrorKind::PacketDrop,
            ]
        );
    }

    #[test]
    fn burst_policy_covers_window() {
        let mut policy = BurstErrorPolicy::new(2, 3, ErrorKind::CrcCorruption);
        let draws: Vec<ErrorKind> = (0..6).map(|_| policy.next()).collect();
        assert_eq!(
            draws,
            vec![
                ErrorKind::None,
                ErrorKind::CrcCorruption,
                ErrorKind::CrcCorruption,
                ErrorKind::CrcCorruption,
                ErrorKind::None,
                ErrorKind::None,
            ]
        );
    }

    #[test]
    fn random_policy_extremes() {
        let mut never = RandomErrorPolicy::with_seed(7, 0.0);
        assert!((0..64).all(|_| never.next() == ErrorKind::None));

        let mut always = RandomErrorPolicy::with_seed(7, 1.0);
        assert!((0..64).all(|_| always.next() == ErrorKind::CrcCorruption));
    }
}
