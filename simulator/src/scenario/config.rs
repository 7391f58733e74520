use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Full description of one planning scenario: both stations' geometry and
/// grids, the co-channel overlap, the UE population mix, and the strategy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub legacy_radius_m: f64,
    pub legacy_tx_power_dbm: f64,
    pub legacy_freq_units: usize,
    pub next_gen_radius_m: f64,
    pub next_gen_tx_power_dbm: f64,
    pub next_gen_freq_units: usize,
    pub next_gen_layers: usize,
    pub time_units: usize,
    /// Bandwidth overlap between the two stations' frequency ranges.
    pub cochannel_width: usize,
    pub ue_count: usize,
    /// Share of UEs deployed with dual connectivity.
    pub dual_share: f64,
    /// Share of UEs deployed legacy-only.
    pub legacy_share: f64,
    /// Request rate range, bits per frame.
    pub request_min: f64,
    pub request_max: f64,
    pub seed: u64,
    pub strategy: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            legacy_radius_m: 500.0,
            legacy_tx_power_dbm: 46.0,
            legacy_freq_units: 200,
            next_gen_radius_m: 300.0,
            next_gen_tx_power_dbm: 40.0,
            next_gen_freq_units: 216,
            next_gen_layers: 3,
            time_units: 16,
            cochannel_width: 40,
            ue_count: 30,
            dual_share: 0.3,
            legacy_share: 0.2,
            request_min: 5_000.0,
            request_max: 40_000.0,
            seed: 7,
            strategy: "dc-ra".to_string(),
        }
    }
}

impl ScenarioConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading scenario config {}", path_ref.display()))?;
        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing scenario config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(ue_count: usize, seed: u64, strategy: String) -> Self {
        Self {
            ue_count,
            seed,
            strategy,
            ..Default::default()
        }
    }
}
