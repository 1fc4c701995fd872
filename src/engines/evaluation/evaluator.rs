//! RL-driven fitness evaluation.
//!
//! Each call leases one executor session, replays `rl.episodes` episodes
//! of a fresh Q-learning policy over the market window and scores the
//! final episode. All randomness comes from the episode seed, so the same
//! genome, generation and base seed reproduce the same record.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};

use super::policy::{state_index, Action, QPolicy, StrategyParams, Transition};
use super::portfolio::Portfolio;
use super::record::{FitnessMetrics, FitnessRecord};
use super::EvaluationFailure;
use crate::config::{ConfigSection, RiskLimits, RlParams};
use crate::engines::generation::genome::{Genome, GenomeId};
use crate::engines::metrics::risk::RiskMetrics;
use crate::error::Result;
use crate::execution::{ExecutorPool, TradeExecutor};
use crate::types::{MarketWindow, Side};

/// Final-episode outcome before it becomes a record
#[derive(Debug, Clone)]
struct EpisodeOutcome {
    book: Portfolio,
    risk_violations: usize,
}

/// Scores genomes against a leased executor session.
///
/// The wall-clock budget is checked between ticks, so one slow executor
/// call can overrun it by that call's latency before the evaluation is
/// reported as a timeout.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    rl: RlParams,
    risk: RiskLimits,
    base_seed: u64,
    budget: Duration,
    lease_timeout: Duration,
}

impl FitnessEvaluator {
    pub fn new(rl: RlParams, risk: RiskLimits, base_seed: u64, budget: Duration, lease_timeout: Duration) -> Result<Self> {
        rl.validate()?;
        risk.validate()?;
        Ok(Self {
            rl,
            risk,
            base_seed,
            budget,
            lease_timeout,
        })
    }

    pub fn rl(&self) -> &RlParams {
        &self.rl
    }

    pub fn risk(&self) -> &RiskLimits {
        &self.risk
    }

    pub fn episode_seed(&self, id: GenomeId, generation: u32) -> u64 {
        splitmix64(self.base_seed ^ splitmix64(id.0) ^ ((generation as u64) << 40))
    }

    /// Scores `genome` in `generation`. Never fails: any fault becomes a
    /// sentinel record carrying the reason.
    pub fn evaluate(&self, genome: &Genome, generation: u32, window: &MarketWindow, pool: &ExecutorPool) -> FitnessRecord {
        let seed = self.episode_seed(genome.id(), generation);
        let started = Instant::now();

        match self.run(genome, window, pool, seed, started + self.budget) {
            Ok((fitness, metrics)) => {
                log::debug!(
                    "{} gen {}: fitness {:.4} return {:.4} drawdown {:.4} trades {} violations {} ({:?})",
                    genome.id(),
                    generation,
                    fitness,
                    metrics.total_return,
                    metrics.max_drawdown,
                    metrics.trade_count,
                    metrics.risk_violations,
                    started.elapsed()
                );
                FitnessRecord::scored(genome.id(), generation, fitness, metrics, seed, window.id())
            }
            Err(failure) => {
                log::warn!("{} gen {}: evaluation failed: {}", genome.id(), generation, failure);
                FitnessRecord::failed(genome.id(), generation, seed, window.id(), failure.to_string())
            }
        }
    }

    fn run(
        &self,
        genome: &Genome,
        window: &MarketWindow,
        pool: &ExecutorPool,
        seed: u64,
        deadline: Instant,
    ) -> std::result::Result<(f64, FitnessMetrics), EvaluationFailure> {
        let params = StrategyParams::from_genome(genome)?;

        let wait = self.lease_timeout.min(deadline.saturating_duration_since(Instant::now()));
        let mut session = pool.acquire(wait)?;

        let ticks = session.get_market_data(window)?;
        let required = params.lookback + 2;
        if ticks.len() < required {
            return Err(EvaluationFailure::NoMarketData {
                window: window.id(),
                ticks: ticks.len(),
                required,
            });
        }
        let prices: Vec<f64> = ticks.iter().map(|t| t.price).collect();

        let mut rng = StdRng::seed_from_u64(seed);
        let mut policy = QPolicy::new(&self.rl);
        let mut outcome = self.episode(&mut *session, &params, &prices, &mut policy, &mut rng, deadline)?;
        for _ in 1..self.rl.episodes {
            outcome = self.episode(&mut *session, &params, &prices, &mut policy, &mut rng, deadline)?;
        }

        let book = &outcome.book;
        let max_drawdown = RiskMetrics::max_drawdown(&book.equity_curve);
        let total_return = book.total_return();
        let fitness = self.rl.reward.fitness(total_return, max_drawdown);
        if !fitness.is_finite() {
            return Err(EvaluationFailure::InvalidGenome(format!(
                "non-finite fitness (return {}, drawdown {})",
                total_return, max_drawdown
            )));
        }

        let metrics = FitnessMetrics {
            total_return,
            max_drawdown,
            win_rate: book.win_rate(),
            trade_count: book.fills,
            risk_violations: outcome.risk_violations,
            episodes: self.rl.episodes,
            sharpe: RiskMetrics::sharpe(&book.equity_curve),
        };
        Ok((fitness, metrics))
    }

    fn episode(
        &self,
        session: &mut dyn TradeExecutor,
        params: &StrategyParams,
        prices: &[f64],
        policy: &mut QPolicy,
        rng: &mut StdRng,
        deadline: Instant,
    ) -> std::result::Result<EpisodeOutcome, EvaluationFailure> {
        let start = params.lookback;
        let last = prices.len() - 1;
        Self::flatten_session(session, prices[start])?;

        let mut book = Portfolio::new(self.rl.initial_equity);
        let mut risk_violations = 0;

        for t in start..last {
            if Instant::now() >= deadline {
                return Err(EvaluationFailure::Timeout {
                    budget_ms: self.budget.as_millis() as u64,
                });
            }

            let state = state_index(params.signal_bucket(prices, t), book.quantity);
            let action = policy.act(state, rng);
            let equity_before = book.equity_curve.last().copied().unwrap_or(book.initial_capital);
            let drawdown_before = book.current_drawdown;

            risk_violations += self.rebalance(session, &mut book, params, action, prices[t])?;

            let equity_after = book.mark(prices[t + 1]);
            let reward = (equity_after - equity_before) / book.initial_capital
                - params.risk_aversion * (book.current_drawdown - drawdown_before).max(0.0);
            let next_state = state_index(params.signal_bucket(prices, t + 1), book.quantity);
            policy.observe(
                Transition {
                    state,
                    action: action.index(),
                    reward,
                    next_state,
                    done: t + 1 == last,
                },
                rng,
            );
        }

        if book.quantity != 0.0 {
            let side = if book.quantity > 0.0 { Side::Sell } else { Side::Buy };
            match session.place_order(side, book.quantity.abs(), Some(prices[last])) {
                Ok(fill) => {
                    book.apply_fill(&fill);
                    book.mark(prices[last]);
                }
                Err(e) if e.is_recoverable() => risk_violations += 1,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(EpisodeOutcome { book, risk_violations })
    }

    /// Moves the book towards `action`. Orders are only placed when the
    /// exposure direction changes. Returns the number of risk violations.
    fn rebalance(
        &self,
        session: &mut dyn TradeExecutor,
        book: &mut Portfolio,
        params: &StrategyParams,
        action: Action,
        price: f64,
    ) -> std::result::Result<usize, EvaluationFailure> {
        let direction = action.direction();
        let current = if book.quantity > 0.0 {
            1.0
        } else if book.quantity < 0.0 {
            -1.0
        } else {
            0.0
        };
        if direction == current {
            return Ok(0);
        }

        let mut violations = 0;
        let mut target = 0.0;
        if direction != 0.0 {
            if book.current_drawdown >= self.risk.max_drawdown {
                // only exposure-reducing orders while in breach
                violations += 1;
            } else {
                let equity = book.equity(price).max(0.0);
                let mut notional = params.position_fraction * equity;
                let cap = self.risk.max_position_size * equity;
                if notional > cap {
                    notional = cap;
                    violations += 1;
                }
                target = direction * notional / price;
            }
        }

        let delta = target - book.quantity;
        if delta.abs() < 1e-12 {
            return Ok(violations);
        }
        let side = if delta > 0.0 { Side::Buy } else { Side::Sell };
        match session.place_order(side, delta.abs(), Some(price)) {
            Ok(fill) => book.apply_fill(&fill),
            Err(e) if e.is_recoverable() => {
                log::debug!("Order rejected, episode continues: {}", e);
                violations += 1;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(violations)
    }

    /// Closes any position a previous lease holder left on the session.
    fn flatten_session(session: &mut dyn TradeExecutor, price: f64) -> std::result::Result<(), EvaluationFailure> {
        let position = session.get_position()?;
        if position.is_flat() {
            return Ok(());
        }
        let side = if position.quantity > 0.0 { Side::Sell } else { Side::Buy };
        match session.place_order(side, position.quantity.abs(), Some(price)) {
            Ok(_) => Ok(()),
            Err(e) if e.is_recoverable() => {
                log::warn!("Could not flatten inherited position of {}: {}", position.quantity, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}
