use crate::config::{
    ExperimentConfig, MeasurementWindow, ScenarioParams, TrafficMode, TransportDefaults,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A scenario file: optional overrides for the experiment, the physical
/// parameters, the transport defaults and the sweep matrix.
#[derive(Deserialize, Debug, Clone)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub experiment: ExperimentOverride,
    #[serde(default)]
    pub params: ScenarioParams,
    #[serde(default)]
    pub transport: TransportDefaults,
    pub sweep: Option<SweepMatrix>,
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self, ScenarioError> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ExperimentOverride {
    pub clients: Option<u32>,
    pub traffic: Option<TrafficMode>,
    pub mobility: Option<bool>,
    pub seed: Option<u64>,
    pub start: Option<f64>,
    pub stop: Option<f64>,
}

impl ExperimentOverride {
    pub fn apply_to(&self, config: &mut ExperimentConfig) {
        if let Some(v) = self.clients {
            config.clients = v;
        }
        if let Some(v) = self.traffic {
            config.traffic = v;
        }
        if let Some(v) = self.mobility {
            config.mobility = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.start {
            config.window.start = v;
        }
        if let Some(v) = self.stop {
            config.window.stop = v;
        }
    }
}

/// Factorial grid of runs: every combination of the four axes.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SweepMatrix {
    pub clients: Vec<u32>,
    pub traffic: Vec<TrafficMode>,
    pub mobility: Vec<bool>,
    pub seeds: Vec<u64>,
}

impl Default for SweepMatrix {
    fn default() -> Self {
        Self {
            clients: vec![1, 2, 4, 8, 16, 32],
            traffic: TrafficMode::ALL.to_vec(),
            mobility: vec![false, true],
            seeds: (1..=5).collect(),
        }
    }
}

impl SweepMatrix {
    pub fn len(&self) -> usize {
        self.clients.len() * self.traffic.len() * self.mobility.len() * self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand the grid, clients outermost and seeds innermost.
    pub fn configs(&self, window: MeasurementWindow) -> Vec<ExperimentConfig> {
        let mut out = Vec::with_capacity(self.len());
        for &clients in &self.clients {
            for &traffic in &self.traffic {
                for &mobility in &self.mobility {
                    for &seed in &self.seeds {
                        out.push(ExperimentConfig {
                            clients,
                            traffic,
                            mobility,
                            seed,
                            window,
                        });
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_touch_given_fields() {
        let scenario = Scenario::from_toml_str(
            r#"
            name = "crowded"
            [experiment]
            clients = 16
            traffic = "mixed"
            stop = 30.0
            "#,
        )
        .unwrap();

        let mut config = ExperimentConfig::default();
        scenario.experiment.apply_to(&mut config);
        assert_eq!(config.clients, 16);
        assert_eq!(config.traffic, TrafficMode::Mixed);
        assert!(!config.mobility);
        assert_eq!(config.seed, 1);
        assert_eq!(config.window, MeasurementWindow::new(1.0, 30.0));
        assert_eq!(scenario.params, ScenarioParams::default());
        assert!(scenario.sweep.is_none());
    }

    #[test]
    fn partial_params_keep_defaults() {
        let scenario = Scenario::from_toml_str(
            r#"
            name = "lossy"
            [params]
            path_loss_exponent = 3.0
            [transport]
            segment_size = 536
            "#,
        )
        .unwrap();
        assert_eq!(scenario.params.path_loss_exponent, 3.0);
        assert_eq!(scenario.params.tx_power_dbm, 16.0);
        assert_eq!(scenario.transport.segment_size, 536);
        assert_eq!(scenario.transport.min_rto, 1.0);
    }

    #[test]
    fn default_sweep_is_the_full_grid() {
        let sweep = SweepMatrix::default();
        assert_eq!(sweep.len(), 180);
        let configs = sweep.configs(MeasurementWindow::default());
        assert_eq!(configs.len(), 180);
        assert_eq!(configs[0].clients, 1);
        assert_eq!(configs[0].seed, 1);
        assert_eq!(configs[4].seed, 5);
        assert!(configs[5].mobility);
        assert_eq!(configs[179].clients, 32);
    }

    #[test]
    fn sweep_table_can_narrow_axes() {
        let scenario = Scenario::from_toml_str(
            r#"
            name = "small"
            [sweep]
            clients = [2]
            seeds = [7, 8]
            "#,
        )
        .unwrap();
        let sweep = scenario.sweep.unwrap();
        assert_eq!(sweep.len(), 2 * 3 * 2);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            Scenario::from_toml_str("name = "),
            Err(ScenarioError::Parse(_))
        ));
    }
}
