// UALINK MODEL — UPLI CREDIT MANAGER
// Credit-based flow control across 4 ports × 4 virtual channels, with an
// optional shared pool per port. Credits initialise via the credit-return
// init-done handshake; returns are capped at the initial allocation.
// Port/VC indices are bounds-asserted: an out-of-range index is a caller bug.

use crate::upli::channel::{UpliCreditReturn, UpliCreditPortFields};
use crate::upli::{MAX_PORTS, MAX_VIRTUAL_CHANNELS};

pub const DEFAULT_CREDITS_PER_VC: usize = 16;
pub const DEFAULT_POOL_CREDITS: usize = 32;

/// Per-VC configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VcCreditConfig {
    pub initial_credits: usize,
    pub enabled: bool,
}

impl Default for VcCreditConfig {
    fn default() -> Self {
        VcCreditConfig {
            initial_credits: DEFAULT_CREDITS_PER_VC,
            enabled: true,
        }
    }
}

/// Per-port configuration: per-VC credits or one shared pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortCreditConfig {
    pub vc_config: [VcCreditConfig; MAX_VIRTUAL_CHANNELS],
    pub pool_credits: usize,
    pub use_pool: bool,
}

impl Default for PortCreditConfig {
    fn default() -> Self {
        PortCreditConfig {
            vc_config: [VcCreditConfig::default(); MAX_VIRTUAL_CHANNELS],
            pool_credits: DEFAULT_POOL_CREDITS,
            use_pool: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreditStats {
    pub credits_consumed: usize,
    pub credits_returned: usize,
    pub credits_available: usize,
    /// Times a send was refused for lack of credit.
    pub send_blocked_count: usize,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VcCreditState {
    pub available_credits: usize,
    pub initial_credits: usize,
    pub init_done: bool,
    pub stats: CreditStats,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PortCreditState {
    pub vc_state: [VcCreditState; MAX_VIRTUAL_CHANNELS],
    pub pool_available: usize,
    pub pool_initial: usize,
    pub use_pool: bool,
    pub port_init_done: bool,
}

pub struct CreditManager {
    port_state: [PortCreditState; MAX_PORTS],
    port_config: [PortCreditConfig; MAX_PORTS],
    initialized: bool,
}

impl CreditManager {
    pub fn new() -> Self {
        CreditManager {
            port_state: [PortCreditState::default(); MAX_PORTS],
            port_config: [PortCreditConfig::default(); MAX_PORTS],
            initialized: false,
        }
    }

    /// Install a port configuration; takes effect on the next
    /// `initialize_credits`.
    pub fn configure_port(&mut self, port_id: u8, config: PortCreditConfig) {
        assert!((port_id as usize) < MAX_PORTS, "port_id out of range");
        self.port_config[port_id as usize] = config;
        self.initialized = false;
    }

    pub fn reset(&mut self) {
        self.port_state = [PortCreditState::default(); MAX_PORTS];
        self.initialized = false;
    }

    /// Load every port's credit counters from its configuration and mark
    /// initialisation done.
    pub fn initialize_credits(&mut self) {
        for (state, config) in self.port_state.iter_mut().zip(self.port_config.iter()) {
            state.use_pool = config.use_pool;

            if config.use_pool {
                state.pool_initial = config.pool_credits;
                state.pool_available = config.pool_credits;
            } else {
                for (vc_state, vc_config) in
                    state.vc_state.iter_mut().zip(config.vc_config.iter())
                {
                    if vc_config.enabled {
                        vc_state.initial_credits = vc_config.initial_credits;
                        vc_state.available_credits = vc_config.initial_credits;
                        vc_state.init_done = true;
                    }
                }
            }

            state.port_init_done = true;
        }
        self.initialized = true;
    }

    pub fn has_credit(&self, port_id: u8, vc: u8) -> bool {
        let state = self.port(port_id);
        Self::check_vc(vc);

        if !state.port_init_done {
            return false;
        }
        if state.use_pool {
            return state.pool_available > 0;
        }
        let vc_state = &state.vc_state[vc as usize];
        vc_state.init_done && vc_state.available_credits > 0
    }

    /// Take one credit for a send. Returns `false` (and counts the blocked
    /// send) when none are available.
    pub fn consume_credit(&mut self, port_id: u8, vc: u8) -> bool {
        if !self.has_credit(port_id, vc) {
            let state = self.port_mut(port_id);
            if !state.use_pool {
                state.vc_state[vc as usize].stats.send_blocked_count += 1;
            }
            return false;
        }

        let state = self.port_mut(port_id);
        if state.use_pool {
            state.pool_available -= 1;
        } else {
            let vc_state = &mut state.vc_state[vc as usize];
            vc_state.available_credits -= 1;
            vc_state.stats.credits_consumed += 1;
            vc_state.stats.credits_available = vc_state.available_credits;
        }
        true
    }

    /// Apply a credit-return word from the remote side. Returns are capped at
    /// the initial allocation; init_done flags latch the port handshake.
    pub fn process_credit_return(&mut self, credits: &UpliCreditReturn) {
        for (port_index, port_credit) in credits.ports.iter().enumerate() {
            if !port_credit.credit_vld {
                continue;
            }

            let credit_count = port_credit.credit_num as usize + 1;
            let state = &mut self.port_state[port_index];

            if port_credit.credit_pool {
                state.pool_available =
                    (state.pool_available + credit_count).min(state.pool_initial);
            } else if (port_credit.credit_vc as usize) < MAX_VIRTUAL_CHANNELS {
                let vc_state = &mut state.vc_state[port_credit.credit_vc as usize];
                vc_state.available_credits =
                    (vc_state.available_credits + credit_count).min(vc_state.initial_credits);
                vc_state.stats.credits_returned += credit_count;
                vc_state.stats.credits_available = vc_state.available_credits;
            }

            if credits.credit_init_done[port_index] {
                state.port_init_done = true;
            }
        }
    }

    /// Local return of `count` credits (e.g. a completed transaction).
    pub fn return_credits(&mut self, port_id: u8, vc: u8, count: usize) {
        Self::check_vc(vc);
        let state = self.port_mut(port_id);

        if state.use_pool {
            state.pool_available = (state.pool_available + count).min(state.pool_initial);
        } else {
            let vc_state = &mut state.vc_state[vc as usize];
            vc_state.available_credits =
                (vc_state.available_credits + count).min(vc_state.initial_credits);
            vc_state.stats.credits_returned += count;
            vc_state.stats.credits_available = vc_state.available_credits;
        }
    }

    /// Build a credit-return word for the remote side: for each initialised
    /// port, up to 4 consumed credits on the first VC that has any. `None`
    /// when there is nothing to return.
    pub fn generate_credit_return(&self) -> Option<UpliCreditReturn> {
        let mut credits = UpliCreditReturn::default();
        let mut has_credits = false;

        for (port_index, state) in self.port_state.iter().enumerate() {
            if !state.port_init_done {
                continue;
            }
            credits.credit_init_done[port_index] = true;

            if state.use_pool {
                continue;
            }

            for (vc_index, vc_state) in state.vc_state.iter().enumerate() {
                let to_return = vc_state.stats.credits_consumed.min(4);
                if to_return > 0 {
                    credits.ports[port_index] = UpliCreditPortFields {
                        credit_vld: true,
                        credit_pool: false,
                        credit_vc: vc_index as u8,
                        credit_num: (to_return - 1) as u8,
                    };
                    has_credits = true;
                    break;
                }
            }
        }

        if has_credits {
            Some(credits)
        } else {
            None
        }
    }

    pub fn available_credits(&self, port_id: u8, vc: u8) -> usize {
        let state = self.port(port_id);
        Self::check_vc(vc);

        if !state.port_init_done {
            return 0;
        }
        if state.use_pool {
            return state.pool_available;
        }
        let vc_state = &state.vc_state[vc as usize];
        if !vc_state.init_done {
            return 0;
        }
        vc_state.available_credits
    }

    pub fn is_initialized(&self, port_id: u8) -> bool {
        self.port(port_id).port_init_done
    }

    pub fn stats(&self, port_id: u8, vc: u8) -> CreditStats {
        Self::check_vc(vc);
        self.port(port_id).vc_state[vc as usize].stats
    }

    pub fn port_state(&self, port_id: u8) -> &PortCreditState {
        self.port(port_id)
    }

    fn port(&self, port_id: u8) -> &PortCreditState {
        assert!((port_id as usize) < MAX_PORTS, "port_id out of range");
        &self.port_state[port_id as usize]
    }

    fn port_mut(&mut self, port_id: u8) -> &mut PortCreditState {
        assert!((port_id as usize) < MAX_PORTS, "port_id out of range");
        &mut self.port_state[port_id as usize]
    }

    fn check_vc(vc: u8) {
        assert!((vc as usize) < MAX_VIRTUAL_CHANNELS, "vc out of range");
    }
}

impl Default for CreditManager {
    fn default() -> Self {
        CreditManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_manager_has_no_credit() {
        let manager = CreditManager::new();
        assert!(!manager.has_credit(0, 0));
        assert_eq!(manager.available_credits(0, 0), 0);
        assert!(!manager.is_initialized(0));
    }

    #[test]
    fn initialize_loads_defaults() {
        let mut manager = CreditManager::new();
        manager.initialize_credits();
        assert!(manager.is_initialized(0));
        assert_eq!(manager.available_credits(2, 3), DEFAULT_CREDITS_PER_VC);
        assert!(manager.has_credit(2, 3));
    }

    #[test]
    fn consume_and_return_per_vc() {
        let mut manager = CreditManager::new();
        manager.initialize_credits();

        assert!(manager.consume_credit(1, 2));
        assert!(manager.consume_credit(1, 2));
        assert_eq!(
            manager.available_credits(1, 2),
            DEFAULT_CREDITS_PER_VC - 2
        );

        manager.return_credits(1, 2, 1);
        assert_eq!(
            manager.available_credits(1, 2),
            DEFAULT_CREDITS_PER_VC - 1
        );
        let stats = manager.stats(1, 2);
        assert_eq!(stats.credits_consumed, 2);
        assert_eq!(stats.credits_returned, 1);
    }

    #[test]
    fn returns_cap_at_initial_allocation() {
        let mut manager = CreditManager::new();
        manager.initialize_credits();
        manager.return_credits(0, 0, 100);
        assert_eq!(manager.available_credits(0, 0), DEFAULT_CREDITS_PER_VC);
    }

    #[test]
    fn exhaustion_blocks_and_counts() {
        let mut config = PortCreditConfig::default();
        for vc in config.vc_config.iter_mut() {
            vc.initial_credits = 1;
        }
        let mut manager = CreditManager::new();
        manager.configure_port(0, config);
        manager.initialize_credits();

        assert!(manager.consume_credit(0, 0));
        assert!(!manager.consume_credit(0, 0));
        assert_eq!(manager.stats(0, 0).send_blocked_count, 1);
    }

    #[test]
    fn pool_mode_shares_credits_across_vcs() {
        let config = PortCreditConfig {
            use_pool: true,
            pool_credits: 2,
            ..PortCreditConfig::default()
        };
        let mut manager = CreditManager::new();
        manager.configure_port(0, config);
        manager.initialize_credits();

        assert!(manager.consume_credit(0, 0));
        assert!(manager.consume_credit(0, 3));
        assert!(!manager.consume_credit(0, 1));
        assert_eq!(manager.available_credits(0, 2), 0);
    }

    #[test]
    fn credit_return_word_replenishes() {
        let mut manager = CreditManager::new();
        manager.initialize_credits();
        manager.consume_credit(0, 1);
        manager.consume_credit(0, 1);
        manager.consume_credit(0, 1);

        let mut word = UpliCreditReturn::default();
        word.ports[0] = UpliCreditPortFields {
            credit_vld: true,
            credit_pool: false,
            credit_vc: 1,
            credit_num: 2, // three credits
        };
        word.credit_init_done[0] = true;
        manager.process_credit_return(&word);

        assert_eq!(manager.available_credits(0, 1), DEFAULT_CREDITS_PER_VC);
    }

    #[test]
    fn generate_return_reports_consumed() {
        let mut manager = CreditManager::new();
        manager.initialize_credits();
        assert!(manager.generate_credit_return().is_none());

        manager.consume_credit(3, 2);
        manager.consume_credit(3, 2);
        let word = manager.generate_credit_return().unwrap();
        assert!(word.ports[3].credit_vld);
        assert_eq!(word.ports[3].credit_vc, 2);
        assert_eq!(word.ports[3].credit_num, 1); // two credits, 0-based
        assert!(word.credit_init_done[3]);
    }
}
