use crate::env::TabularMdp;

/// An agent that learns an episodic tabular MDP online
///
/// Agents are constructed with a fixed number of episodes K and interact with
/// the environment strictly sequentially: roll out one episode, absorb the
/// observed transitions, refresh the model and value estimates, then begin
/// the next episode.
pub trait EpisodicAgent<E: TabularMdp> {
    /// Run all K configured episodes to completion
    ///
    /// **Returns** the cumulative reward after each episode. The running
    /// total is never reset between episodes, so with non-negative rewards
    /// the returned sequence is non-decreasing.
    fn run(&mut self, env: &mut E) -> Vec<f64>;

    /// Name of the algorithm, for logs and experiment output
    fn name(&self) -> &'static str;
}
