use crate::env::TabularMdp;

/// DeepSea environment
///
/// An N by N descending grid. The diver starts at the top-left corner and
/// sinks one row per step, choosing to drift left (action 0, free) or swim
/// right (action 1, costing `0.01 / N`). Swimming right from the bottom-right
/// cell pays the treasure reward of 1, so the only rewarding policy swims
/// right on every step and eats the small cost N times, a classic trap for
/// greedy agents. Deterministic; horizon N.
pub struct DeepSea {
    size: usize,
    row: usize,
    col: usize,
}

impl DeepSea {
    /// Initialize DeepSea with grid size `size`
    pub fn new(size: usize) -> Self {
        assert!(size >= 2, "`size` must be at least 2");
        Self {
            size,
            row: 0,
            col: 0,
        }
    }

    fn encode(&self, row: usize, col: usize) -> usize {
        row * self.size + col
    }
}

impl TabularMdp for DeepSea {
    fn n_states(&self) -> usize {
        self.size * self.size
    }

    fn n_actions(&self) -> usize {
        2
    }

    fn ep_len(&self) -> usize {
        self.size
    }

    fn reset(&mut self) {
        self.row = 0;
        self.col = 0;
    }

    fn advance(&mut self, action: usize) -> (f64, Option<usize>, bool) {
        assert!(action < 2, "Invalid action: {}", action);
        let reward = self.mean_reward(self.encode(self.row, self.col), action);

        self.col = if action == 0 {
            self.col.saturating_sub(1)
        } else {
            (self.col + 1).min(self.size - 1)
        };
        self.row += 1;

        if self.row == self.size {
            (reward, None, true)
        } else {
            (reward, Some(self.encode(self.row, self.col)), false)
        }
    }

    fn state(&self) -> usize {
        self.encode(self.row, self.col)
    }

    fn timestep(&self) -> usize {
        self.row
    }

    fn mean_reward(&self, state: usize, action: usize) -> f64 {
        if action == 0 {
            0.0
        } else if state == self.n_states() - 1 {
            1.0 - 0.01 / self.size as f64
        } else {
            -0.01 / self.size as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_sea_functional() {
        let mut env = DeepSea::new(4);
        env.reset();
        assert_eq!(env.state(), 0);
        assert_eq!(env.timestep(), 0);

        // Drifting left forever earns nothing.
        let mut total = 0.0;
        for step in 1..=4 {
            let (reward, next, done) = env.advance(0);
            total += reward;
            assert_eq!(done, step == 4);
            assert_eq!(next.is_none(), done);
        }
        assert_eq!(total, 0.0);
    }

    #[test]
    fn swimming_right_finds_the_treasure() {
        let mut env = DeepSea::new(4);
        env.reset();
        let mut total = 0.0;
        let mut done = false;
        while !done {
            let (reward, _, terminal) = env.advance(1);
            total += reward;
            done = terminal;
        }
        // N cost increments, the last one folded into the treasure payout.
        let expected = 1.0 - 4.0 * 0.01 / 4.0;
        assert!((total - expected).abs() < 1e-12);
    }
}
