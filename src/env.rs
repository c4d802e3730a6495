/// Represents a finite-horizon episodic tabular MDP, the narrow interface
/// through which every agent in this crate consumes an environment.
///
/// States are the dense codes `0..n_states()` and actions are
/// `0..n_actions()`, so enumeration order is stable by construction and
/// agents can back their tables with flat arrays instead of keyed maps.
///
/// An episode is started with [`reset`](TabularMdp::reset) and driven with
/// [`advance`](TabularMdp::advance) until the returned done flag is set.
/// Environments that end an episode purely by horizon exhaustion may report
/// `done = true` together with an ordinary `Some(next_state)`; `None` is the
/// terminal sentinel for states with no successor. Agents must accept both.
pub trait TabularMdp {
    /// Number of states
    fn n_states(&self) -> usize;

    /// Number of actions
    fn n_actions(&self) -> usize;

    /// Fixed number of timesteps per episode
    fn ep_len(&self) -> usize;

    /// Begin a new episode, side effect only
    fn reset(&mut self);

    /// Apply an action, producing `(reward, next_state, done)`
    fn advance(&mut self, action: usize) -> (f64, Option<usize>, bool);

    /// Current state, valid after `reset`/`advance`
    fn state(&self) -> usize;

    /// Current within-episode step index, valid after `reset`/`advance`
    fn timestep(&self) -> usize;

    /// True deterministic reward for a state-action pair
    fn mean_reward(&self, state: usize, action: usize) -> f64;
}
