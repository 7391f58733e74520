use anyhow::Context;
use rancore::network::UeOutcome;
use rancore::prelude::{by_name, strategy_names, ChannelModel, StrategyReport};
use serde::Serialize;

use crate::scenario::config::ScenarioConfig;
use crate::scenario::deploy::{build_network, deploy_ues};

/// Everything one run produces: the strategy summary plus the per-UE
/// outcome records for the report file.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub report: StrategyReport,
    pub ues: Vec<UeOutcome>,
}

#[derive(Clone)]
pub struct Runner {
    config: ScenarioConfig,
}

impl Runner {
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    /// Builds the scenario, deploys the population, and executes the
    /// configured strategy.
    pub fn execute(&self) -> anyhow::Result<RunResult> {
        let mut network = build_network(&self.config)?;
        deploy_ues(&mut network, &self.config).context("deploying the UE population")?;
        let channel = ChannelModel::new(&network);
        let strategy = by_name(&self.config.strategy).with_context(|| {
            format!(
                "unknown strategy '{}', expected one of {:?}",
                self.config.strategy,
                strategy_names()
            )
        })?;
        let report = strategy.run(&mut network, &channel);
        Ok(RunResult {
            report,
            ues: network.outcomes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_executes_every_strategy() {
        for &name in strategy_names() {
            let config = ScenarioConfig {
                ue_count: 6,
                seed: 5,
                strategy: name.to_string(),
                ..Default::default()
            };
            let result = Runner::new(config).execute().unwrap();
            assert_eq!(result.report.strategy, name);
            assert_eq!(result.ues.len(), 6);
            assert_eq!(
                result.report.allocated.len() + result.report.unallocated.len(),
                6
            );
        }
    }

    #[test]
    fn runner_rejects_an_unknown_strategy() {
        let config = ScenarioConfig {
            ue_count: 1,
            strategy: "greedy".to_string(),
            ..Default::default()
        };
        let error = Runner::new(config).execute().unwrap_err();
        assert!(format!("{error}").contains("unknown strategy"));
    }

    #[test]
    fn allocated_ues_meet_their_requests() {
        let config = ScenarioConfig {
            ue_count: 10,
            seed: 42,
            ..Default::default()
        };
        let result = Runner::new(config).execute().unwrap();
        for outcome in &result.ues {
            if outcome.is_allocated {
                assert!(outcome.throughput >= outcome.request_rate);
            } else {
                assert_eq!(outcome.throughput, 0.0);
            }
        }
    }
}
