// UALINK MODEL — DL PACING
// Pluggable pacing hooks over the serialize paths. Not part of the wire
// protocol: the callbacks model host flow control and rate limits so tests
// can drive backpressure scenarios.

/// Decision returned by the tx pacing hook before a flit is packed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacingDecision {
    Allow,
    Throttle,
    Drop,
}

/// Tx pacing hook: (flit_count, total_bytes) → decision.
pub type TxPacingFn = Box<dyn FnMut(usize, usize) -> PacingDecision>;
/// Rx rate observer: (flit_count, total_bytes, crc_valid).
pub type RxRateFn = Box<dyn FnMut(usize, usize, bool)>;

/// Holds the tx/rx hooks for one link side. Hooks are owned; setting a hook
/// replaces the previous one.
pub struct PacingController {
    tx_callback: Option<TxPacingFn>,
    rx_callback: Option<RxRateFn>,
}

impl PacingController {
    pub fn new() -> Self {
        PacingController {
            tx_callback: None,
            rx_callback: None,
        }
    }

    pub fn set_tx_callback(
        &mut self,
        callback: impl FnMut(usize, usize) -> PacingDecision + 'static,
    ) {
        self.tx_callback = Some(Box::new(callback));
    }

    pub fn set_rx_callback(&mut self, callback: impl FnMut(usize, usize, bool) + 'static) {
        self.rx_callback = Some(Box::new(callback));
    }

    /// Consult the tx hook; no hook means Allow.
    pub fn check_tx(&mut self, flit_count: usize, total_bytes: usize) -> PacingDecision {
        match self.tx_callback.as_mut() {
            Some(callback) => callback(flit_count, total_bytes),
            None => PacingDecision::Allow,
        }
    }

    /// Report a received flit to the rx observer, if any.
    pub fn notify_rx(&mut self, flit_count: usize, total_bytes: usize, crc_valid: bool) {
        if let Some(callback) = self.rx_callback.as_mut() {
            callback(flit_count, total_bytes, crc_valid);
        }
    }

    pub fn has_tx_callback(&self) -> bool {
        self.tx_callback.is_some()
    }

    pub fn has_rx_callback(&self) -> bool {
        self.rx_callback.is_some()
    }

    pub fn clear_callbacks(&mut self) {
        self.tx_callback = None;
        self.rx_callback = None;
    }
}

impl Default for PacingController {
    fn default() -> Self {
        PacingController::new()
    }
}

// ============================================================================
// BUILT-IN POLICIES
// ============================================================================

/// Allows up to N TL flits per window; throttles past the limit until the
/// window resets.
pub struct FlitRateLimiter {
    max_flits_per_window: usize,
    current_window_count: usize,
}

impl FlitRateLimiter {
    pub fn new(max_flits_per_window: usize) -> Self {
        FlitRateLimiter {
            max_flits_per_window,
            current_window_count: 0,
        }
    }

    pub fn check(&mut self, flit_count: usize, _total_bytes: usize) -> PacingDecision {
        if self.current_window_count + flit_count > self.max_flits_per_window {
            return PacingDecision::Throttle;
        }
        self.current_window_count += flit_count;
        PacingDecision::Allow
    }

    pub fn reset_window(&mut self) {
        self.current_window_count = 0;
    }

    pub fn window_count(&self) -> usize {
        self.current_window_count
    }
}

/// Byte-budget variant of the window limiter.
pub struct ByteRateLimiter {
    max_bytes_per_window: usize,
    current_window_bytes: usize,
}

impl ByteRateLimiter {
    pub fn new(max_bytes_per_window: usize) -> Self {
        ByteRateLimiter {
            max_bytes_per_window,
            current_window_bytes: 0,
        }
    }

    pub fn check(&mut self, _flit_count: usize, total_bytes: usize) -> PacingDecision {
        if self.current_window_bytes + total_bytes > self.max_bytes_per_window {
            return PacingDecision::Throttle;
        }
        self.current_window_bytes += total_bytes;
        PacingDecision::Allow
    }

    pub fn reset_window(&mut self) {
        self.current_window_bytes = 0;
    }

    pub fn window_bytes(&self) -> usize {
        self.current_window_bytes
    }
}

/// Tracks receive-side buffer occupancy and signals backpressure at 3/4 fill.
pub struct RxBackpressureTracker {
    buffer_capacity: usize,
    current_occupancy: usize,
    backpressure_threshold: usize,
}

impl RxBackpressureTracker {
    pub fn new(buffer_capacity: usize) -> Self {
        RxBackpressureTracker {
            buffer_capacity,
            current_occupancy: 0,
            backpressure_threshold: buffer_capacity * 3 / 4,
        }
    }

    /// Rx observer entry point.
    pub fn observe(&mut self, flit_count: usize, _total_bytes: usize, _crc_valid: bool) {
        self.current_occupancy = (self.current_occupancy + flit_count).min(self.buffer_capacity);
    }

    pub fn should_signal_backpressure(&self) -> bool {
        self.current_occupancy >= self.backpressure_threshold
    }

    /// Simulate host processing draining the buffer.
    pub fn consume_flits(&mut self, count: usize) {
        self.current_occupancy = self.current_occupancy.saturating_sub(count);
    }

    pub fn buffer_occupancy(&self) -> usize {
        self.current_occupancy
    }

    pub fn reset(&mut self) {
        self.current_occupancy = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn default_decision_is_allow() {
        let mut pacing = PacingController::new();
        assert!(!pacing.has_tx_callback());
        assert_eq!(pacing.check_tx(4, 256), PacingDecision::Allow);
    }

    #[test]
    fn tx_callback_drives_decision() {
        let mut pacing = PacingController::new();
        pacing.set_tx_callback(|count, _| {
            if count > 2 {
                PacingDecision::Drop
            } else {
                PacingDecision::Allow
            }
        });
        assert_eq!(pacing.check_tx(1, 64), PacingDecision::Allow);
        assert_eq!(pacing.check_tx(3, 192), PacingDecision::Drop);
    }

    #[test]
    fn rx_observer_sees_crc_status() {
        let mut pacing = PacingController::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        pacing.set_rx_callback(move |count, bytes, ok| sink.borrow_mut().push((count, bytes, ok)));

        pacing.notify_rx(2, 128, true);
        pacing.notify_rx(0, 0, false);
        assert_eq!(*seen.borrow(), vec![(2, 128, true), (0, 0, false)]);
    }

    #[test]
    fn flit_limiter_throttles_past_window() {
        let mut limiter = FlitRateLimiter::new(4);
        assert_eq!(limiter.check(3, 0), PacingDecision::Allow);
        assert_eq!(limiter.check(2, 0), PacingDecision::Throttle);
        assert_eq!(limiter.window_count(), 3);
        limiter.reset_window();
        assert_eq!(limiter.check(2, 0), PacingDecision::Allow);
    }

    #[test]
    fn byte_limiter_throttles_past_budget() {
        let mut limiter = ByteRateLimiter::new(256);
        assert_eq!(limiter.check(0, 192), PacingDecision::Allow);
        assert_eq!(limiter.check(0, 128), PacingDecision::Throttle);
        assert_eq!(limiter.window_bytes(), 192);
    }

    #[test]
    fn backpressure_at_three_quarters() {
        let mut tracker = RxBackpressureTracker::new(8);
        tracker.observe(5, 0, true);
        assert!(!tracker.should_signal_backpressure());
        tracker.observe(1, 0, true);
        assert!(tracker.should_signal_backpressure());
        tracker.consume_flits(4);
        assert!(!tracker.should_signal_backpressure());
        assert_eq!(tracker.buffer_occupancy(), 2);
    }
}
