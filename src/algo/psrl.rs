use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Dirichlet, Normal};

use crate::{agent::EpisodicAgent, env::TabularMdp, util::random_argmax};

/// Configuration for the [`PsrlAgent`]
pub struct PsrlAgentConfig {
    /// Prior mean of the reward posterior per state-action pair
    ///
    /// **Default**: `0.0`
    pub prior_mean: f64,
    /// Prior variance of the reward posterior per state-action pair
    ///
    /// **Default**: `1.0`
    pub prior_variance: f64,
    /// Assumed observation-noise variance of the reward signal
    ///
    /// **Default**: `1e-5` (the testbed rewards are deterministic)
    pub reward_noise: f64,
    /// Additive constant that keeps Dirichlet concentration vectors strictly
    /// positive before any transition has been counted
    ///
    /// **Default**: `3e-3`
    pub dirichlet_stabilizer: f64,
    /// RNG seed; seeded from entropy when `None`
    ///
    /// **Default**: `None`
    pub seed: Option<u64>,
}

impl Default for PsrlAgentConfig {
    fn default() -> Self {
        Self {
            prior_mean: 0.0,
            prior_variance: 1.0,
            reward_noise: 1e-5,
            dirichlet_stabilizer: 3e-3,
            seed: None,
        }
    }
}

/// Posterior sampling agent
///
/// Maintains a Dirichlet-Multinomial posterior over transitions and a
/// Normal-Normal conjugate posterior over rewards per state-action pair.
/// Once per episode it draws one model from the posterior and computes a
/// randomized value iteration against that sample; acting greedily with
/// respect to a sampled model is the exploration mechanism.
pub struct PsrlAgent {
    n_states: usize,
    n_actions: usize,
    ep_len: usize,
    episodes: usize,
    /// Dirichlet pseudo-counts over next states per state-action pair,
    /// monotonically incremented
    alpha: Vec<Vec<f64>>,
    /// Reward posterior mean per state-action pair
    mu: Vec<f64>,
    /// Reward posterior variance per state-action pair, kept positive by the
    /// precision-combination update
    sigma2: Vec<f64>,
    /// Observed transitions bucketed by within-episode timestep
    buffer: Vec<Vec<(usize, usize, f64, Option<usize>)>>,
    /// Number of timestep buckets the episode currently being absorbed has
    /// pushed into; cleared by `update_statistics`
    pending: usize,
    /// Per-episode posterior draws, overwritten by `update_priors`
    r_bar: Vec<f64>,
    r_sample: Vec<f64>,
    p_sample: Vec<Vec<f64>>,
    q: Vec<f64>,
    v: Vec<f64>,
    reward_noise: f64,
    dirichlet_stabilizer: f64,
    rng: StdRng,
}

impl PsrlAgent {
    /// Initialize a new `PsrlAgent` for a given environment and episode count
    ///
    /// **Panics** if `prior_variance`, `reward_noise` or
    /// `dirichlet_stabilizer` is not positive; each keeps a posterior or
    /// sampling distribution valid.
    pub fn new(env: &impl TabularMdp, episodes: usize, config: PsrlAgentConfig) -> Self {
        assert!(
            config.prior_variance > 0.0,
            "`prior_variance` must be positive"
        );
        assert!(config.reward_noise > 0.0, "`reward_noise` must be positive");
        assert!(
            config.dirichlet_stabilizer > 0.0,
            "`dirichlet_stabilizer` must be positive"
        );
        let n_states = env.n_states();
        let n_pairs = n_states * env.n_actions();
        Self {
            n_states,
            n_actions: env.n_actions(),
            ep_len: env.ep_len(),
            episodes,
            alpha: vec![vec![0.0; n_states]; n_pairs],
            mu: vec![config.prior_mean; n_pairs],
            sigma2: vec![config.prior_variance; n_pairs],
            buffer: vec![Vec::new(); env.ep_len()],
            pending: 0,
            r_bar: vec![0.0; n_pairs],
            r_sample: vec![0.0; n_pairs],
            p_sample: vec![vec![0.0; n_states]; n_pairs],
            q: vec![0.0; n_pairs],
            v: vec![0.0; n_states],
            reward_noise: config.reward_noise,
            dirichlet_stabilizer: config.dirichlet_stabilizer,
            rng: match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        }
    }

    fn pair(&self, state: usize, action: usize) -> usize {
        state * self.n_actions + action
    }

    /// Action-value table of the current sampled model, flat over
    /// `(state, action)` pairs
    pub fn get_q_table(&self) -> &[f64] {
        &self.q
    }

    /// State-value table of the current sampled model
    pub fn get_value_table(&self) -> &[f64] {
        &self.v
    }

    /// Choose the action maximizing the current sampled-model Q estimate,
    /// breaking ties uniformly at random
    pub fn act(&mut self, state: usize) -> usize {
        let values = &self.q[state * self.n_actions..(state + 1) * self.n_actions];
        random_argmax(values, &mut self.rng)
    }

    /// Append an observed transition to the bucket for timestep `t`
    pub fn update_buffer(
        &mut self,
        state: usize,
        action: usize,
        reward: f64,
        next_state: Option<usize>,
        t: usize,
    ) {
        self.buffer[t].push((state, action, reward, next_state));
        self.pending = self.pending.max(t + 1);
    }

    /// Absorb the most recently completed episode and refresh the sampled
    /// model and value estimates
    pub fn learn(&mut self) {
        self.update_statistics();
        self.update_priors();
        self.update_value_functions();
    }

    /// Fold the transitions recorded by the most recent episode into the
    /// posteriors
    ///
    /// Buckets are append-only, so the newest entry of every bucket the
    /// episode pushed into is that episode's transition; buckets the episode
    /// never reached are left alone, which keeps early-terminating episodes
    /// from desynchronizing later ones. Transition counts skip the terminal
    /// sentinel; rewards go through the standard Normal-Normal
    /// precision-weighted update, which keeps `sigma2` strictly positive.
    pub fn update_statistics(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for t in 0..pending {
            let Some(&(state, action, reward, next_state)) = self.buffer[t].last() else {
                continue;
            };
            let idx = self.pair(state, action);
            if let Some(next) = next_state {
                self.alpha[idx][next] += 1.0;
            }
            let prior_precision = 1.0 / self.sigma2[idx];
            let obs_precision = 1.0 / self.reward_noise;
            self.mu[idx] = (prior_precision * self.mu[idx] + obs_precision * reward)
                / (prior_precision + obs_precision);
            self.sigma2[idx] = 1.0 / (prior_precision + obs_precision);
        }
    }

    /// Draw one model from the current posterior
    ///
    /// Per state-action pair: a posterior reward mean, a reward sample around
    /// it, and a transition-probability vector from the stabilized Dirichlet.
    pub fn update_priors(&mut self) {
        let reward_noise_std = self.reward_noise.sqrt();
        for idx in 0..self.mu.len() {
            let mean_dist = Normal::new(self.mu[idx], self.sigma2[idx].sqrt()).unwrap();
            self.r_bar[idx] = self.rng.sample(mean_dist);
            let reward_dist = Normal::new(self.r_bar[idx], reward_noise_std).unwrap();
            self.r_sample[idx] = self.rng.sample(reward_dist);

            let concentration = self.alpha[idx]
                .iter()
                .map(|&a| a + self.dirichlet_stabilizer)
                .collect::<Vec<_>>();
            let dirichlet = Dirichlet::new(&concentration).unwrap();
            let p = self.rng.sample(dirichlet);
            if p.iter().all(|x| x.is_finite()) {
                self.p_sample[idx] = p;
            } else {
                // The gamma draws behind a near-zero concentration vector can
                // all underflow to zero, leaving NaNs after normalization. The
                // limiting distribution is a one-hot at a uniform coordinate.
                let mut one_hot = vec![0.0; self.n_states];
                one_hot[self.rng.gen_range(0..self.n_states)] = 1.0;
                self.p_sample[idx] = one_hot;
            }
        }
    }

    /// Randomized value iteration against the sampled model
    ///
    /// Runs `ep_len + 10` sweeps; the extra iterations are a stability margin
    /// rather than a horizon-exact count. Every Q backup adds zero-mean
    /// Gaussian noise whose variance shrinks with the pair's visit count, an
    /// exploration bonus that decays with data.
    pub fn update_value_functions(&mut self) {
        let mut q = vec![0.0; self.q.len()];
        let mut v = vec![0.0; self.n_states];
        for _ in 0..self.ep_len + 10 {
            for s in 0..self.n_states {
                for a in 0..self.n_actions {
                    let idx = self.pair(s, a);
                    let visits: f64 = self.alpha[idx].iter().sum();
                    let variance =
                        ((self.ep_len + 1) as f64).powi(2) / (visits - 2.0).max(1.0);
                    let noise_dist = Normal::new(0.0, variance.sqrt()).unwrap();
                    let noise: f64 = self.rng.sample(noise_dist);
                    let expected_value = self.p_sample[idx]
                        .iter()
                        .zip(&v)
                        .map(|(p, value)| p * value)
                        .sum::<f64>();
                    q[idx] = self.r_sample[idx] + expected_value + noise;
                }
                v[s] = (0..self.n_actions)
                    .map(|a| q[self.pair(s, a)])
                    .fold(f64::NEG_INFINITY, f64::max);
            }
        }
        self.q = q;
        self.v = v;
    }
}

impl<E: TabularMdp> EpisodicAgent<E> for PsrlAgent {
    fn run(&mut self, env: &mut E) -> Vec<f64> {
        let mut totals = Vec::with_capacity(self.episodes);
        let mut total = 0.0;
        for episode in 0..self.episodes {
            env.reset();
            let mut done = false;
            while !done {
                let state = env.state();
                let t = env.timestep();
                let action = self.act(state);
                let (reward, next_state, terminal) = env.advance(action);
                total += reward;
                done = terminal;
                self.update_buffer(state, action, reward, if done { None } else { next_state }, t);
            }
            self.learn();
            totals.push(total);
            debug!(
                "PSRL episode {}/{}: cumulative reward {:.3}",
                episode + 1,
                self.episodes,
                total
            );
        }
        totals
    }

    fn name(&self) -> &'static str {
        "PSRL"
    }
}

#[cfg(test)]
mod tests {
    use crate::env::tests::MockMdp;

    use super::*;

    #[test]
    fn reward_sequence_has_length_k() {
        let mut env = MockMdp::new();
        let mut agent = PsrlAgent::new(&env, 30, PsrlAgentConfig::default());
        let totals = agent.run(&mut env);
        assert_eq!(totals.len(), 30);
    }

    #[test]
    fn update_statistics_counts_transition_and_pulls_mean() {
        let env = MockMdp::new();
        let mut agent = PsrlAgent::new(&env, 1, PsrlAgentConfig::default());
        let prior_mu = agent.mu[0];
        agent.update_buffer(0, 0, 1.0, Some(1), 0);
        agent.update_statistics();

        assert_eq!(agent.alpha[0][1], 1.0);
        assert_eq!(agent.alpha[0][0], 0.0);
        assert!(
            agent.mu[0] > prior_mu && agent.mu[0] <= 1.0,
            "posterior mean must move strictly toward the observation"
        );
        assert!(agent.sigma2[0] > 0.0 && agent.sigma2[0] < 1.0);
    }

    #[test]
    fn late_timestep_statistics_survive_a_short_episode() {
        // Horizon-2 environment whose first episode terminates after one
        // step; every later episode runs the full horizon and pays reward 1
        // at timestep 1 from state 1. The short episode must not stop the
        // timestep-1 observations from reaching the reward posterior.
        struct StutterChain {
            episode: usize,
            state: usize,
            timestep: usize,
        }

        impl TabularMdp for StutterChain {
            fn n_states(&self) -> usize {
                2
            }
            fn n_actions(&self) -> usize {
                2
            }
            fn ep_len(&self) -> usize {
                2
            }
            fn reset(&mut self) {
                self.episode += 1;
                self.state = 0;
                self.timestep = 0;
            }
            fn advance(&mut self, _action: usize) -> (f64, Option<usize>, bool) {
                self.timestep += 1;
                if self.episode == 1 {
                    (0.0, None, true)
                } else if self.timestep == 1 {
                    self.state = 1;
                    (0.0, Some(1), false)
                } else {
                    (1.0, None, true)
                }
            }
            fn state(&self) -> usize {
                self.state
            }
            fn timestep(&self) -> usize {
                self.timestep
            }
            fn mean_reward(&self, state: usize, _action: usize) -> f64 {
                if state == 1 {
                    1.0
                } else {
                    0.0
                }
            }
        }

        let mut env = StutterChain {
            episode: 0,
            state: 0,
            timestep: 0,
        };
        let mut agent = PsrlAgent::new(&env, 6, PsrlAgentConfig::default());
        agent.run(&mut env);

        assert_eq!(agent.buffer[0].len(), 6);
        assert_eq!(agent.buffer[1].len(), 5);
        // Five reward-1 observations split between the two actions at state
        // 1; whichever action was taken must have been pulled off the prior.
        let absorbed = (0..2).map(|a| agent.mu[agent.pair(1, a)]).fold(0.0, f64::max);
        assert!(
            absorbed > 0.9,
            "timestep-1 rewards never reached the posterior: mu = {absorbed}"
        );
    }

    #[test]
    fn sampled_transitions_are_distributions() {
        let mut env = MockMdp::new();
        let mut agent = PsrlAgent::new(&env, 10, PsrlAgentConfig::default());
        agent.run(&mut env);
        agent.update_priors();
        for p in &agent.p_sample {
            assert!(p.iter().all(|&x| x >= 0.0));
            let sum: f64 = p.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum = {sum}");
        }
    }

    #[test]
    fn value_table_is_max_over_actions() {
        let mut env = MockMdp::new();
        let mut agent = PsrlAgent::new(&env, 8, PsrlAgentConfig::default());
        agent.run(&mut env);
        let q = agent.get_q_table();
        for (s, &v) in agent.get_value_table().iter().enumerate() {
            let best = (0..2).map(|a| q[s * 2 + a]).fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(v, best);
        }
    }

    #[test]
    fn act_does_not_mutate_learned_state() {
        let mut env = MockMdp::new();
        let mut agent = PsrlAgent::new(&env, 5, PsrlAgentConfig::default());
        agent.run(&mut env);

        let alpha = agent.alpha.clone();
        let mu = agent.mu.clone();
        let sigma2 = agent.sigma2.clone();
        let q = agent.q.clone();
        agent.act(0);
        assert_eq!(agent.alpha, alpha);
        assert_eq!(agent.mu, mu);
        assert_eq!(agent.sigma2, sigma2);
        assert_eq!(agent.q, q);
    }
}
