use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::{agent::EpisodicAgent, env::TabularMdp, util::random_argmax};

/// Configuration for the [`RlsviAgent`]
pub struct RlsviAgentConfig {
    /// Variance of the Gaussian prior pseudo-observation per state-action pair
    ///
    /// **Default**: `1.0`
    pub prior_variance: f64,
    /// Mean of the Gaussian perturbation applied to buffered rewards
    ///
    /// **Default**: `-0.1`
    pub noise_mean: f64,
    /// Variance of the Gaussian perturbation applied to buffered rewards
    ///
    /// **Default**: `0.05`
    pub noise_variance: f64,
    /// RNG seed; seeded from entropy when `None`
    ///
    /// **Default**: `None`
    pub seed: Option<u64>,
}

impl Default for RlsviAgentConfig {
    fn default() -> Self {
        Self {
            prior_variance: 1.0,
            noise_mean: -0.1,
            noise_variance: 0.05,
            seed: None,
        }
    }
}

/// Randomized least-squares value iteration agent
///
/// Keeps an append-only buffer of every observed transition per state-action
/// pair. After each episode the action-value table is recomputed from scratch
/// by a finite-horizon backward sweep over the buffer in which every buffered
/// reward is independently perturbed with Gaussian noise and every pair gets
/// one Gaussian prior draw; the sweep combines empirical return sums with the
/// prior through the closed-form Bayesian linear regression posterior mean.
/// The randomized perturbation is the exploration mechanism; there is no
/// separate exploration phase.
pub struct RlsviAgent {
    n_actions: usize,
    ep_len: usize,
    episodes: usize,
    /// Observed `(reward, next_state)` pairs per state-action pair,
    /// append-only for the lifetime of the agent
    buffer: Vec<Vec<(f64, Option<usize>)>>,
    q: Vec<f64>,
    prior_variance: f64,
    noise_mean: f64,
    noise_variance: f64,
    rng: StdRng,
}

impl RlsviAgent {
    /// Initialize a new `RlsviAgent` for a given environment and episode count
    ///
    /// **Panics** if `prior_variance` or `noise_variance` is not positive;
    /// either would make the precision-weighted posterior combination blow up.
    pub fn new(env: &impl TabularMdp, episodes: usize, config: RlsviAgentConfig) -> Self {
        assert!(
            config.prior_variance > 0.0,
            "`prior_variance` must be positive"
        );
        assert!(
            config.noise_variance > 0.0,
            "`noise_variance` must be positive"
        );
        let n_pairs = env.n_states() * env.n_actions();
        Self {
            n_actions: env.n_actions(),
            ep_len: env.ep_len(),
            episodes,
            buffer: vec![Vec::new(); n_pairs],
            q: vec![0.0; n_pairs],
            prior_variance: config.prior_variance,
            noise_mean: config.noise_mean,
            noise_variance: config.noise_variance,
            rng: match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        }
    }

    fn pair(&self, state: usize, action: usize) -> usize {
        state * self.n_actions + action
    }

    /// Choose the action maximizing the current Q estimate at `state`,
    /// breaking ties uniformly at random
    pub fn act(&mut self, state: usize) -> usize {
        let values = &self.q[self.pair(state, 0)..=self.pair(state, self.n_actions - 1)];
        random_argmax(values, &mut self.rng)
    }

    /// Append an observed transition to the buffer
    ///
    /// `next_state` is `None` for the terminal transition of an episode.
    pub fn update_buffer(&mut self, state: usize, action: usize, reward: f64, next_state: Option<usize>) {
        let idx = self.pair(state, action);
        self.buffer[idx].push((reward, next_state));
    }

    /// Recompute the action-value table from the buffer
    ///
    /// Performs exactly `ep_len` backward sweeps over freshly perturbed
    /// copies of the buffered rewards. Terminal transitions contribute only
    /// their reward; every other transition contributes the reward plus the
    /// running next-state value. The per-pair result is the posterior mean of
    /// the perturbed return sum combined with one Gaussian prior draw.
    pub fn learn_from_buffer(&mut self) {
        let noise_std = self.noise_variance.sqrt();
        let perturbed = self
            .buffer
            .iter()
            .map(|transitions| {
                transitions
                    .iter()
                    .map(|&(reward, next)| {
                        let z: f64 = self.rng.sample(StandardNormal);
                        (reward + self.noise_mean + noise_std * z, next)
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let prior_std = self.prior_variance.sqrt();
        let prior = (0..self.buffer.len())
            .map(|_| {
                let z: f64 = self.rng.sample(StandardNormal);
                prior_std * z
            })
            .collect::<Vec<_>>();

        let mut q = vec![0.0; self.buffer.len()];
        let mut q_next = vec![0.0; self.buffer.len()];
        for _ in 0..self.ep_len {
            for (idx, transitions) in perturbed.iter().enumerate() {
                let mut sum = 0.0;
                for &(reward, next) in transitions {
                    let value = match next {
                        Some(next) => (0..self.n_actions)
                            .map(|a| q[next * self.n_actions + a])
                            .fold(f64::NEG_INFINITY, f64::max),
                        None => 0.0,
                    };
                    sum += reward + value;
                }
                let n = self.buffer[idx].len() as f64;
                let posterior_precision = n / self.noise_variance + 1.0 / self.prior_variance;
                q_next[idx] = (sum / self.noise_variance + prior[idx] / self.prior_variance)
                    / posterior_precision;
            }
            std::mem::swap(&mut q, &mut q_next);
        }
        self.q = q;
    }
}

impl<E: TabularMdp> EpisodicAgent<E> for RlsviAgent {
    fn run(&mut self, env: &mut E) -> Vec<f64> {
        let mut totals = Vec::with_capacity(self.episodes);
        let mut total = 0.0;
        for episode in 1..=self.episodes {
            env.reset();
            let mut done = false;
            while !done {
                let state = env.state();
                let action = self.act(state);
                let (reward, next_state, terminal) = env.advance(action);
                total += reward;
                done = terminal;
                self.update_buffer(state, action, reward, if done { None } else { next_state });
            }
            self.learn_from_buffer();
            totals.push(total);
            debug!(
                "RLSVI episode {}/{}: cumulative reward {:.3}",
                episode, self.episodes, total
            );
        }
        totals
    }

    fn name(&self) -> &'static str {
        "RLSVI"
    }
}
