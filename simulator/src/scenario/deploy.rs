use anyhow::Context;
use rancore::prelude::{
    CircularRegion, Connection, Coordinate, LinkInfo, Network, Numerology, Station, StationKind,
    UeId, UserEquipment,
};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::scenario::config::ScenarioConfig;

/// Builds the two co-located stations from the scenario geometry.
pub fn build_network(config: &ScenarioConfig) -> anyhow::Result<Network> {
    let center = Coordinate::new(0.0, 0.0);
    let legacy = Station::new(
        StationKind::Legacy,
        CircularRegion::new(center, config.legacy_radius_m),
        config.legacy_tx_power_dbm,
        config.legacy_freq_units,
        config.time_units,
        1,
    );
    let next_gen = Station::new(
        StationKind::NextGen,
        CircularRegion::new(center, config.next_gen_radius_m),
        config.next_gen_tx_power_dbm,
        config.next_gen_freq_units,
        config.time_units,
        config.next_gen_layers,
    );
    Network::new(legacy, next_gen, config.cochannel_width).context("building scenario topology")
}

/// Seeded random UE deployment: positions inside the relevant coverage
/// circle, connection-kind mix per the configured shares, request rates and
/// candidate numerologies sampled uniformly. The same seed reproduces the
/// same population.
pub fn deploy_ues(network: &mut Network, config: &ScenarioConfig) -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    for index in 0..config.ue_count {
        let roll: f64 = rng.gen();
        let connection = if roll < config.dual_share {
            Connection::Dual {
                legacy: LinkInfo::new(),
                next_gen: LinkInfo::new(),
            }
        } else if roll < config.dual_share + config.legacy_share {
            Connection::LegacyOnly(LinkInfo::new())
        } else {
            Connection::NextGenOnly(LinkInfo::new())
        };

        // Legacy-only UEs may sit anywhere in the legacy cell; anything
        // attaching to the next-generation station stays inside its radius.
        let radius = if matches!(connection, Connection::LegacyOnly(_)) {
            config.legacy_radius_m
        } else {
            config.next_gen_radius_m
        };
        let coord = sample_in_disc(&mut rng, radius);

        let candidates = if matches!(connection, Connection::LegacyOnly(_)) {
            Vec::new()
        } else {
            let count = rng.gen_range(1..=3);
            let mut picked: Vec<Numerology> = Numerology::ALL
                .choose_multiple(&mut rng, count)
                .copied()
                .collect();
            picked.sort();
            picked
        };

        let request_rate = rng.gen_range(config.request_min..config.request_max);
        let ue = UserEquipment::new(
            UeId(index),
            coord,
            request_rate,
            candidates,
            connection,
        )
        .with_context(|| format!("deploying UE {index}"))?;
        network.add_ue(ue);
    }
    Ok(())
}

/// Uniform sample inside a disc around the origin.
fn sample_in_disc(rng: &mut StdRng, radius: f64) -> Coordinate {
    let r = radius * rng.gen::<f64>().sqrt();
    let theta = rng.gen_range(0.0..std::f64::consts::TAU);
    Coordinate::new(r * theta.cos(), r * theta.sin())
}
