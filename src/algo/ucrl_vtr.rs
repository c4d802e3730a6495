use log::debug;
use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    agent::EpisodicAgent,
    env::TabularMdp,
    exploration::{Choice, ExploreFirst},
    util::random_argmax,
};

/// Configuration for the [`UcrlVtrAgent`]
pub struct UcrlVtrAgentConfig {
    /// Ridge coefficient regularizing the regression's normal matrix
    ///
    /// **Default**: `1.0`
    pub ridge: f64,
    /// Assumed upper bound on the 2-norm of the true regression parameter
    ///
    /// **Default**: `3.0`
    pub param_bound: f64,
    /// Take uniformly random actions for the first tenth of the run instead
    /// of switching to greedy actions after the first episode
    ///
    /// **Default**: `false`
    pub random_explore: bool,
    /// RNG seed; seeded from entropy when `None`
    ///
    /// **Default**: `None`
    pub seed: Option<u64>,
}

impl Default for UcrlVtrAgentConfig {
    fn default() -> Self {
        Self {
            ridge: 1.0,
            param_bound: 3.0,
            random_explore: false,
            seed: None,
        }
    }
}

/// Index bijections for tabular one-hot features
///
/// The feature space has one coordinate per `(s, a, s')` triple; with dense
/// state and action codes the state bijection is the identity and the triple
/// bijection is plain row-major arithmetic. Built once at construction,
/// before any other operation touches a feature index.
struct FeatureIdx {
    n_states: usize,
    n_actions: usize,
}

impl FeatureIdx {
    fn new(n_states: usize, n_actions: usize) -> Self {
        Self {
            n_states,
            n_actions,
        }
    }

    /// Feature dimension `|S| * |A| * |S|`
    fn dim(&self) -> usize {
        self.n_states * self.n_actions * self.n_states
    }

    /// Feature coordinate of the `(s, a, s')` triple
    fn triple(&self, state: usize, action: usize, next_state: usize) -> usize {
        (state * self.n_actions + action) * self.n_states + next_state
    }

    /// Flat index of the `(s, a)` pair in the Q tables
    fn pair(&self, state: usize, action: usize) -> usize {
        state * self.n_actions + action
    }
}

/// Value-target regression agent with a confidence-bound bonus
///
/// Implements UCRL-VTR on tabular one-hot features: instead of estimating
/// transition probabilities, it regresses observed next-state value targets
/// onto `(s, a, s')` indicator features with a ridge-regularized least
/// squares estimate, and inflates its Q predictions by a self-normalized
/// confidence half-width (Abbasi-Yadkori style) under the accumulated Gram
/// matrix. The bonus is largest for rarely visited features, which drives
/// optimism-based exploration. Assumes rewards in `[0, 1]`.
///
/// The Gram matrix starts at `ridge * I` and accumulates outer products, so
/// it stays symmetric positive-definite for the whole run; its inverse is
/// maintained by Sherman-Morrison rank-one updates and its log-determinant
/// by the matrix determinant lemma, instead of a full O(d^3) inversion per
/// observation.
pub struct UcrlVtrAgent {
    n_states: usize,
    n_actions: usize,
    ep_len: usize,
    episodes: usize,
    idx: FeatureIdx,
    /// True mean rewards, read once from the environment
    rewards: Vec<f64>,
    /// Gram matrix `ridge * I + sum X X^T`
    m: Array2<f64>,
    /// Inverse of the Gram matrix, kept in lockstep with `m`
    m_inv: Array2<f64>,
    /// `ln det M`, kept in lockstep with `m`
    log_det_m: f64,
    /// Accumulated regression targets `sum y X`
    w: Array1<f64>,
    /// Ridge-regression coefficient estimate `M^-1 w`
    theta: Array1<f64>,
    /// Q tables per timestep, clipped to `[0, ep_len]`
    q: Vec<Vec<f64>>,
    /// V tables per timestep; `v[ep_len]` stays zero as the terminal
    /// boundary condition
    v: Vec<Vec<f64>>,
    ridge: f64,
    param_bound: f64,
    /// Failure probability of the confidence bound, `1 / K`
    delta: f64,
    schedule: ExploreFirst,
    rng: StdRng,
}

impl UcrlVtrAgent {
    /// Initialize a new `UcrlVtrAgent` for a given environment and episode
    /// count
    ///
    /// **Panics** if `ridge` is not positive; without the ridge term the
    /// normal matrix can be singular.
    pub fn new(env: &impl TabularMdp, episodes: usize, config: UcrlVtrAgentConfig) -> Self {
        assert!(config.ridge > 0.0, "`ridge` must be positive");
        assert!(episodes > 0, "`episodes` must be positive");
        let idx = FeatureIdx::new(env.n_states(), env.n_actions());
        let d = idx.dim();
        let rewards = (0..env.n_states())
            .flat_map(|s| (0..env.n_actions()).map(move |a| (s, a)))
            .map(|(s, a)| env.mean_reward(s, a))
            .collect();
        let cutoff = if config.random_explore {
            episodes as f64 / 10.0
        } else {
            1.0
        };
        Self {
            n_states: env.n_states(),
            n_actions: env.n_actions(),
            ep_len: env.ep_len(),
            episodes,
            idx,
            rewards,
            m: Array2::eye(d) * config.ridge,
            m_inv: Array2::eye(d) / config.ridge,
            log_det_m: d as f64 * config.ridge.ln(),
            w: Array1::zeros(d),
            theta: Array1::zeros(d),
            q: vec![vec![0.0; env.n_states() * env.n_actions()]; env.ep_len()],
            v: vec![vec![0.0; env.n_states()]; env.ep_len() + 1],
            ridge: config.ridge,
            param_bound: config.param_bound,
            delta: 1.0 / episodes as f64,
            schedule: ExploreFirst::new(cutoff),
            rng: match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        }
    }

    /// Regression feature for `(s, a)` at timestep `h`: the next-step value
    /// estimates scattered into the one-hot coordinates of every possible
    /// successor, so that `<X, theta>` approximates the expected next-state
    /// value
    pub fn feature_vector(&self, state: usize, action: usize, h: usize) -> Array1<f64> {
        let mut x = Array1::zeros(self.idx.dim());
        for next in 0..self.n_states {
            x[self.idx.triple(state, action, next)] = self.v[h + 1][next];
        }
        x
    }

    /// Absorb one observed transition into the regression statistics
    ///
    /// `h` is the timestep at which `state` was visited. The target is the
    /// current value estimate of the successor; the terminal sentinel targets
    /// zero, matching the boundary condition on `v[ep_len]`.
    pub fn update_stat(&mut self, state: usize, action: usize, next_state: Option<usize>, h: usize) {
        let x = self.feature_vector(state, action, h);
        let y = match next_state {
            Some(next) => self.v[h + 1][next],
            None => 0.0,
        };

        // Rank-one update: M += X X^T, with M^-1 and ln det M maintained by
        // Sherman-Morrison and the matrix determinant lemma.
        let mx = self.m_inv.dot(&x);
        let denom = 1.0 + x.dot(&mx);
        self.m += &outer(&x, &x);
        self.m_inv -= &(outer(&mx, &mx) / denom);
        self.log_det_m += denom.ln();
        self.w.scaled_add(y, &x);
    }

    /// Refresh the regression coefficient estimate, once per episode after
    /// all within-episode transitions are absorbed
    pub fn update_param(&mut self) {
        self.theta = self.m_inv.dot(&self.w);
    }

    /// Confidence radius for episode `k` (1-based)
    ///
    /// `sqrt(ridge) * m2 + sqrt(2 ln(1/delta) + ln(k det M / ridge^d))`,
    /// the self-normalized martingale bound sizing the exploration bonus.
    pub fn beta(&self, k: usize) -> f64 {
        let log_term =
            2.0 * (1.0 / self.delta).ln() + (k as f64).ln() + self.log_det_m
                - self.idx.dim() as f64 * self.ridge.ln();
        self.ridge.sqrt() * self.param_bound + log_term.sqrt()
    }

    /// Refresh one Q entry: regression prediction plus the confidence
    /// half-width under the current Gram matrix, clipped to `[0, ep_len]`
    pub fn update_q(&mut self, state: usize, action: usize, k: usize, h: usize) {
        let x = self.feature_vector(state, action, h);
        let width = x.dot(&self.m_inv.dot(&x)).max(0.0).sqrt();
        let value = self.rewards[self.idx.pair(state, action)]
            + x.dot(&self.theta)
            + self.beta(k) * width;
        self.q[h][self.idx.pair(state, action)] = value.clamp(0.0, self.ep_len as f64);
    }

    /// Backward sweep refreshing every Q and V entry at the end of episode
    /// `k`; must run strictly after [`update_param`](Self::update_param)
    pub fn update_q_end(&mut self, k: usize) {
        for h in (0..self.ep_len).rev() {
            for s in 0..self.n_states {
                for a in 0..self.n_actions {
                    self.update_q(s, a, k, h);
                }
                self.v[h][s] = (0..self.n_actions)
                    .map(|a| self.q[h][self.idx.pair(s, a)])
                    .fold(f64::NEG_INFINITY, f64::max);
            }
        }
    }

    /// Choose an action at `(state, h)` during episode `k` (1-based):
    /// uniformly random while the exploration schedule says so, greedy with
    /// random tie-break afterwards
    pub fn act(&mut self, state: usize, h: usize, k: usize) -> usize {
        match self.schedule.choose(k) {
            Choice::Explore => self.rng.gen_range(0..self.n_actions),
            Choice::Exploit => {
                let first = self.idx.pair(state, 0);
                let values = self.q[h][first..first + self.n_actions].to_vec();
                random_argmax(&values, &mut self.rng)
            }
        }
    }
}

/// Outer product `x y^T`
fn outer(x: &Array1<f64>, y: &Array1<f64>) -> Array2<f64> {
    let col = x.view().insert_axis(Axis(1));
    let row = y.view().insert_axis(Axis(0));
    col.dot(&row)
}

impl<E: TabularMdp> EpisodicAgent<E> for UcrlVtrAgent {
    fn run(&mut self, env: &mut E) -> Vec<f64> {
        let mut totals = Vec::with_capacity(self.episodes);
        let mut total = 0.0;
        for k in 1..=self.episodes {
            env.reset();
            let mut done = false;
            while !done {
                let state = env.state();
                let h = env.timestep();
                let action = self.act(state, h, k);
                let (reward, next_state, terminal) = env.advance(action);
                total += reward;
                done = terminal;
                self.update_stat(state, action, next_state, h);
            }
            self.update_param();
            self.update_q_end(k);
            totals.push(total);
            debug!(
                "UCRL-VTR episode {}/{}: cumulative reward {:.3}, beta {:.3}",
                k,
                self.episodes,
                total,
                self.beta(k)
            );
        }
        totals
    }

    fn name(&self) -> &'static str {
        "UCRL-VTR"
    }
}

#[cfg(test)]
mod tests {
    use crate::{env::tests::MockMdp, gym::RiverSwim};

    use super::*;

    fn seeded_config() -> UcrlVtrAgentConfig {
        UcrlVtrAgentConfig {
            seed: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn reward_sequence_has_length_k() {
        let mut env = MockMdp::new();
        let mut agent = UcrlVtrAgent::new(&env, 40, seeded_config());
        let totals = agent.run(&mut env);
        assert_eq!(totals.len(), 40);
    }

    #[test]
    fn q_values_stay_clipped_to_horizon() {
        let mut env = RiverSwim::new(4, 6);
        let mut agent = UcrlVtrAgent::new(&env, 20, seeded_config());
        agent.run(&mut env);
        for table in &agent.q {
            for &q in table {
                assert!((0.0..=agent.ep_len as f64).contains(&q), "q = {q}");
            }
        }
    }

    #[test]
    fn gram_matrix_stays_symmetric_and_invertible() {
        let mut env = RiverSwim::new(4, 6);
        let mut agent = UcrlVtrAgent::new(&env, 15, seeded_config());
        agent.run(&mut env);

        let d = agent.idx.dim();
        for i in 0..d {
            for j in 0..d {
                assert!((agent.m[[i, j]] - agent.m[[j, i]]).abs() < 1e-9);
            }
        }
        let product = agent.m.dot(&agent.m_inv);
        for i in 0..d {
            for j in 0..d {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (product[[i, j]] - expected).abs() < 1e-6,
                    "M * M^-1 deviates at ({i}, {j})"
                );
            }
        }
        assert!(agent.log_det_m >= d as f64 * agent.ridge.ln() - 1e-9);
    }

    #[test]
    fn beta_is_non_decreasing_in_episode_for_fixed_statistics() {
        let mut env = MockMdp::new();
        let mut agent = UcrlVtrAgent::new(&env, 10, seeded_config());
        agent.run(&mut env);
        let mut last = agent.beta(1);
        for k in 2..=10 {
            let beta = agent.beta(k);
            assert!(beta >= last);
            last = beta;
        }
    }

    #[test]
    fn learns_the_rewarding_action_past_the_exploration_threshold() {
        // 2-state, 2-action, horizon-1 deterministic MDP: action 0 from
        // state 0 pays 1 and terminates, action 1 pays 0. Greedy acting
        // starts after episode 1 with `random_explore` off.
        let mut env = MockMdp::new();
        let mut agent = UcrlVtrAgent::new(&env, 30, seeded_config());
        agent.run(&mut env);
        for _ in 0..20 {
            assert_eq!(agent.act(0, 0, 30), 0);
        }
    }

    #[test]
    fn act_does_not_mutate_learned_state() {
        let mut env = MockMdp::new();
        let mut agent = UcrlVtrAgent::new(&env, 5, seeded_config());
        agent.run(&mut env);

        let m = agent.m.clone();
        let m_inv = agent.m_inv.clone();
        let w = agent.w.clone();
        let theta = agent.theta.clone();
        let q = agent.q.clone();
        let v = agent.v.clone();
        agent.act(0, 0, 5);
        assert_eq!(agent.m, m);
        assert_eq!(agent.m_inv, m_inv);
        assert_eq!(agent.w, w);
        assert_eq!(agent.theta, theta);
        assert_eq!(agent.q, q);
        assert_eq!(agent.v, v);
    }

    #[test]
    #[should_panic(expected = "ridge")]
    fn non_positive_ridge_panics() {
        let env = MockMdp::new();
        UcrlVtrAgent::new(
            &env,
            1,
            UcrlVtrAgentConfig {
                ridge: 0.0,
                ..Default::default()
            },
        );
    }
}
