use rand::Rng;

use crate::env::TabularMdp;

/// RiverSwim environment
///
/// A chain of states with a current flowing toward state 0. Swimming left
/// (action 0) always succeeds and pays a trickle reward 5/1000 at state 0;
/// swimming right (action 1) fights the current and only sometimes advances,
/// paying reward 1 at the last state. An agent must sustain a long streak of
/// uncertain right moves before seeing the large reward, which makes the
/// environment a standard exploration stress test. Episodes end on horizon
/// exhaustion, never by reaching a terminal state.
pub struct RiverSwim {
    n_states: usize,
    ep_len: usize,
    state: usize,
    timestep: usize,
}

impl RiverSwim {
    /// Initialize RiverSwim with a custom chain length and horizon
    pub fn new(n_states: usize, ep_len: usize) -> Self {
        assert!(n_states >= 2, "`n_states` must be at least 2");
        assert!(ep_len >= 1, "`ep_len` must be at least 1");
        Self {
            n_states,
            ep_len,
            state: 0,
            timestep: 0,
        }
    }
}

impl Default for RiverSwim {
    fn default() -> Self {
        Self::new(6, 20)
    }
}

impl TabularMdp for RiverSwim {
    fn n_states(&self) -> usize {
        self.n_states
    }

    fn n_actions(&self) -> usize {
        2
    }

    fn ep_len(&self) -> usize {
        self.ep_len
    }

    fn reset(&mut self) {
        self.state = 0;
        self.timestep = 0;
    }

    fn advance(&mut self, action: usize) -> (f64, Option<usize>, bool) {
        assert!(action < 2, "Invalid action: {}", action);
        let reward = self.mean_reward(self.state, action);

        let last = self.n_states - 1;
        self.state = if action == 0 {
            self.state.saturating_sub(1)
        } else {
            let roll = rand::thread_rng().gen::<f64>();
            if self.state == 0 {
                // Stay 0.65, advance 0.35
                if roll < 0.35 {
                    1
                } else {
                    0
                }
            } else if self.state == last {
                // Stay 0.6, slip back 0.4
                if roll < 0.6 {
                    last
                } else {
                    last - 1
                }
            } else {
                // Slip back 0.05, stay 0.6, advance 0.35
                if roll < 0.05 {
                    self.state - 1
                } else if roll < 0.65 {
                    self.state
                } else {
                    self.state + 1
                }
            }
        };

        self.timestep += 1;
        let done = self.timestep == self.ep_len;
        (reward, Some(self.state), done)
    }

    fn state(&self) -> usize {
        self.state
    }

    fn timestep(&self) -> usize {
        self.timestep
    }

    fn mean_reward(&self, state: usize, action: usize) -> f64 {
        if state == 0 && action == 0 {
            5.0 / 1000.0
        } else if state == self.n_states - 1 && action == 1 {
            1.0
        } else {
            0.0
        }
    }
}
