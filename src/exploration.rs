/// Exploration policy result
pub enum Choice {
    Explore,
    Exploit,
}

/// Hard-threshold exploration schedule
///
/// Explores for the first `cutoff` episodes and exploits for every episode
/// after that. There is no annealing; the switch is a single step.
pub struct ExploreFirst {
    cutoff: f64,
}

impl ExploreFirst {
    /// Initialize the schedule with the last episode (1-based) that explores
    pub fn new(cutoff: f64) -> Self {
        Self { cutoff }
    }

    /// Invoke the schedule for the current episode (1-based)
    pub fn choose(&self, episode: usize) -> Choice {
        if episode as f64 > self.cutoff {
            Choice::Exploit
        } else {
            Choice::Explore
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explore_first_switches_once() {
        let policy = ExploreFirst::new(5.0);
        assert!(matches!(policy.choose(1), Choice::Explore));
        assert!(matches!(policy.choose(5), Choice::Explore));
        assert!(matches!(policy.choose(6), Choice::Exploit));
        assert!(matches!(policy.choose(100), Choice::Exploit));
    }
}
