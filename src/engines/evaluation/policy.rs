//! Tabular Q-learning policy driven by a genome's strategy parameters.
//!
//! The state is the genome's price signal bucketed by its entry threshold,
//! crossed with the current exposure. Actions pick a target exposure.

use rand::Rng;
use std::collections::VecDeque;

use crate::config::RlParams;
use crate::engines::evaluation::EvaluationFailure;
use crate::engines::generation::genome::Genome;

pub const N_ACTIONS: usize = 3;
const N_SIGNALS: usize = 3;
const N_EXPOSURES: usize = 3;
pub const N_STATES: usize = N_SIGNALS * N_EXPOSURES;

/// Initial preference for the action that follows the signal
const SIGNAL_PRIOR: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Flat,
    Long,
    Short,
}

impl Action {
    pub fn from_index(i: usize) -> Self {
        match i {
            1 => Action::Long,
            2 => Action::Short,
            _ => Action::Flat,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Action::Flat => 0,
            Action::Long => 1,
            Action::Short => 2,
        }
    }

    /// Target exposure direction
    pub fn direction(&self) -> f64 {
        match self {
            Action::Flat => 0.0,
            Action::Long => 1.0,
            Action::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Momentum,
    MeanReversion,
}

/// Strategy parameters decoded from genes. Missing genes take defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub lookback: usize,
    pub entry_threshold: f64,
    pub position_fraction: f64,
    pub risk_aversion: f64,
    pub signal: SignalKind,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            lookback: 10,
            entry_threshold: 0.005,
            position_fraction: 0.1,
            risk_aversion: 1.0,
            signal: SignalKind::Momentum,
        }
    }
}

impl StrategyParams {
    pub fn from_genome(genome: &Genome) -> Result<Self, EvaluationFailure> {
        let defaults = Self::default();
        let signal = match genome.categorical("signal") {
            None | Some("momentum") => SignalKind::Momentum,
            Some("mean_reversion") => SignalKind::MeanReversion,
            Some(other) => {
                return Err(EvaluationFailure::InvalidGenome(format!(
                    "unknown signal kind '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            lookback: genome
                .real("lookback")
                .map(|v| v.round().max(1.0) as usize)
                .unwrap_or(defaults.lookback),
            entry_threshold: genome.real("entry_threshold").unwrap_or(defaults.entry_threshold).abs(),
            position_fraction: genome
                .real("position_fraction")
                .unwrap_or(defaults.position_fraction)
                .max(0.0),
            risk_aversion: genome.real("risk_aversion").unwrap_or(defaults.risk_aversion).max(0.0),
            signal,
        })
    }

    /// Bucketed signal at index `t`: 0 bearish, 1 neutral, 2 bullish.
    pub fn signal_bucket(&self, prices: &[f64], t: usize) -> usize {
        if t < self.lookback || prices[t - self.lookback] <= 0.0 {
            return 1;
        }
        let mut change = prices[t] / prices[t - self.lookback] - 1.0;
        if self.signal == SignalKind::MeanReversion {
            change = -change;
        }
        if change > self.entry_threshold {
            2
        } else if change < -self.entry_threshold {
            0
        } else {
            1
        }
    }
}

pub fn state_index(signal_bucket: usize, exposure: f64) -> usize {
    let exposure_bucket = if exposure > 0.0 {
        1
    } else if exposure < 0.0 {
        2
    } else {
        0
    };
    signal_bucket.min(N_SIGNALS - 1) * N_EXPOSURES + exposure_bucket
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub state: usize,
    pub action: usize,
    pub reward: f64,
    pub next_state: usize,
    pub done: bool,
}

/// Bounded experience replay buffer
#[derive(Debug)]
pub struct ReplayMemory {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Uniform sample with replacement
    pub fn sample<R: Rng + ?Sized>(&self, batch: usize, rng: &mut R) -> Vec<Transition> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        (0..batch)
            .map(|_| self.buffer[rng.gen_range(0..self.buffer.len())])
            .collect()
    }
}

/// Epsilon-greedy Q-table learner. One instance per evaluation call.
#[derive(Debug)]
pub struct QPolicy {
    q: [[f64; N_ACTIONS]; N_STATES],
    learning_rate: f64,
    gamma: f64,
    epsilon: f64,
    epsilon_end: f64,
    epsilon_decay: f64,
    batch_size: usize,
    memory: ReplayMemory,
}

impl QPolicy {
    pub fn new(rl: &RlParams) -> Self {
        let mut q = [[0.0; N_ACTIONS]; N_STATES];
        for exposure in 0..N_EXPOSURES {
            q[exposure][Action::Short.index()] = SIGNAL_PRIOR;
            q[N_EXPOSURES + exposure][Action::Flat.index()] = SIGNAL_PRIOR;
            q[2 * N_EXPOSURES + exposure][Action::Long.index()] = SIGNAL_PRIOR;
        }
        Self {
            q,
            learning_rate: rl.learning_rate,
            gamma: rl.gamma,
            epsilon: rl.epsilon_start,
            epsilon_end: rl.epsilon_end,
            epsilon_decay: rl.epsilon_decay,
            batch_size: rl.batch_size,
            memory: ReplayMemory::new(rl.memory_size),
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn greedy(&self, state: usize) -> Action {
        let row = &self.q[state];
        let mut best = 0;
        for a in 1..N_ACTIONS {
            if row[a] > row[best] {
                best = a;
            }
        }
        Action::from_index(best)
    }

    pub fn act<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> Action {
        if rng.gen::<f64>() < self.epsilon {
            Action::from_index(rng.gen_range(0..N_ACTIONS))
        } else {
            self.greedy(state)
        }
    }

    /// Stores the transition, replays a batch once the memory holds one,
    /// then decays exploration.
    pub fn observe<R: Rng + ?Sized>(&mut self, transition: Transition, rng: &mut R) {
        self.memory.push(transition);
        if self.memory.len() >= self.batch_size {
            for t in self.memory.sample(self.batch_size, rng) {
                self.update(&t);
            }
        } else {
            self.update(&transition);
        }
        self.epsilon = (self.epsilon * self.epsilon_decay).max(self.epsilon_end);
    }

    fn update(&mut self, t: &Transition) {
        let future = if t.done {
            0.0
        } else {
            self.q[t.next_state].iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        };
        let target = t.reward + self.gamma * future;
        let current = self.q[t.state][t.action];
        self.q[t.state][t.action] = current + self.learning_rate * (target - current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn prior_follows_signal() {
        let policy = QPolicy::new(&RlParams::default());
        assert_eq!(policy.greedy(state_index(2, 0.0)), Action::Long);
        assert_eq!(policy.greedy(state_index(0, 0.0)), Action::Short);
        assert_eq!(policy.greedy(state_index(1, 1.0)), Action::Flat);
    }

    #[test]
    fn learning_overrides_prior() {
        let rl = RlParams {
            learning_rate: 0.5,
            batch_size: 1,
            memory_size: 1,
            ..Default::default()
        };
        let mut policy = QPolicy::new(&rl);
        let mut rng = StdRng::seed_from_u64(0);
        let state = state_index(2, 0.0);
        for _ in 0..20 {
            policy.observe(
                Transition { state, action: Action::Long.index(), reward: -1.0, next_state: state, done: true },
                &mut rng,
            );
        }
        assert_ne!(policy.greedy(state), Action::Long);
    }

    #[test]
    fn epsilon_decays_to_floor() {
        let rl = RlParams {
            epsilon_start: 1.0,
            epsilon_end: 0.2,
            epsilon_decay: 0.5,
            ..Default::default()
        };
        let mut policy = QPolicy::new(&rl);
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..10 {
            policy.observe(
                Transition { state: 0, action: 0, reward: 0.0, next_state: 0, done: false },
                &mut rng,
            );
        }
        assert!((policy.epsilon() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn replay_memory_is_bounded() {
        let mut memory = ReplayMemory::new(3);
        for i in 0..5 {
            memory.push(Transition { state: i, action: 0, reward: 0.0, next_state: 0, done: false });
        }
        assert_eq!(memory.len(), 3);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(memory.sample(10, &mut rng).iter().all(|t| t.state >= 2));
    }

    #[test]
    fn mean_reversion_flips_the_bucket() {
        let prices = [100.0, 100.0, 110.0];
        let momentum = StrategyParams { lookback: 2, ..Default::default() };
        let reversion = StrategyParams { lookback: 2, signal: SignalKind::MeanReversion, ..Default::default() };
        assert_eq!(momentum.signal_bucket(&prices, 2), 2);
        assert_eq!(reversion.signal_bucket(&prices, 2), 0);
        assert_eq!(momentum.signal_bucket(&prices, 1), 1);
    }
}
