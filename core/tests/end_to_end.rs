//! End-to-end allocation scenarios over the public API.

use rancore::prelude::*;

fn topology(gnb_layers: usize, cochannel_width: usize) -> Network {
    let center = Coordinate::new(0.0, 0.0);
    let enb = Station::new(
        StationKind::Legacy,
        CircularRegion::new(center, 500.0),
        46.0,
        200,
        16,
        1,
    );
    let gnb = Station::new(
        StationKind::NextGen,
        CircularRegion::new(center, 300.0),
        40.0,
        216,
        16,
        gnb_layers,
    );
    Network::new(enb, gnb, cochannel_width).expect("valid topology")
}

fn add_ue(
    network: &mut Network,
    distance_m: f64,
    request_rate: f64,
    candidates: Vec<Numerology>,
    connection: Connection,
) -> UeId {
    let id = UeId(network.ues.len());
    let ue = UserEquipment::new(
        id,
        Coordinate::new(distance_m, 0.0),
        request_rate,
        candidates,
        connection,
    )
    .expect("valid profile");
    network.add_ue(ue)
}

fn next_gen_spaces(network: &mut Network) -> Vec<Space> {
    let frame = &mut network.gnb.frame;
    let mut spaces = Vec::new();
    for index in 0..frame.layers.len() {
        spaces.extend(frame.layer_mut(index).empty_spaces());
    }
    spaces
}

#[test]
fn close_ue_gets_exactly_the_blocks_its_request_needs() {
    let mut network = topology(3, 0);
    // One N2 block at the top MCS carries ~7465 bits/frame, so a 20 kbit
    // request needs three blocks and not one more.
    let ue = add_ue(
        &mut network,
        60.0,
        20_000.0,
        vec![Numerology::N2],
        Connection::NextGenOnly(LinkInfo::new()),
    );
    let channel = ChannelModel::new(&network);
    let spaces = next_gen_spaces(&mut network);
    let mut journal = Journal::new();
    let mut allocator = Allocator::new(&mut network, &channel);
    assert!(allocator.allocate_ue(
        ue,
        &spaces,
        None,
        AllocationPolicy::default(),
        &mut journal
    ));
    journal.purge(&mut network);

    let link = network.ue(ue).link(StationKind::NextGen).unwrap();
    assert_eq!(link.blocks.len(), 3);
    assert_eq!(link.mcs.level(), 15);
    assert!(network.ue(ue).throughput >= 20_000.0);

    // Exactly three blocks' worth of cells is occupied, nothing else.
    let occupied: usize = network
        .gnb
        .frame
        .layers
        .iter()
        .map(Layer::occupied_units)
        .sum();
    assert_eq!(occupied, 3 * 16);
    assert_eq!(network.enb.frame.layer(0).occupied_units(), 0);
}

#[test]
fn failed_allocation_leaves_no_trace() {
    let mut network = topology(2, 40);
    let reachable = add_ue(
        &mut network,
        70.0,
        10_000.0,
        vec![Numerology::N1],
        Connection::NextGenOnly(LinkInfo::new()),
    );
    let hopeless = add_ue(
        &mut network,
        100_000.0,
        1e9,
        vec![Numerology::N0],
        Connection::NextGenOnly(LinkInfo::new()),
    );
    let channel = ChannelModel::new(&network);

    // Pre-place the serviceable UE so the rollback has occupied state to
    // leave untouched.
    let spaces = next_gen_spaces(&mut network);
    let mut setup = Journal::new();
    {
        let mut allocator = Allocator::new(&mut network, &channel);
        assert!(allocator.allocate_ue(
            reachable,
            &spaces,
            None,
            AllocationPolicy::default(),
            &mut setup
        ));
    }
    setup.purge(&mut network);

    let before = network.clone();
    let spaces = next_gen_spaces(&mut network);
    let mut journal = Journal::new();
    {
        let mut allocator = Allocator::new(&mut network, &channel);
        assert!(!allocator.allocate_ue(
            hopeless,
            &spaces,
            None,
            AllocationPolicy::default(),
            &mut journal
        ));
    }
    assert!(journal.is_empty());

    assert_eq!(network.ue(reachable), before.ue(reachable));
    assert_eq!(network.ue(hopeless), before.ue(hopeless));
    for (old, new) in before
        .gnb
        .frame
        .layers
        .iter()
        .zip(network.gnb.frame.layers.iter())
    {
        assert_eq!(old.available_offset, new.available_offset);
        for f in 0..old.freq_units() {
            for t in 0..old.time_units() {
                assert_eq!(old.cell(f, t), new.cell(f, t));
            }
        }
    }
}

#[test]
fn allocated_ues_always_cover_their_requests() {
    let mut network = topology(3, 40);
    add_ue(
        &mut network,
        60.0,
        20_000.0,
        vec![Numerology::N2],
        Connection::NextGenOnly(LinkInfo::new()),
    );
    add_ue(
        &mut network,
        90.0,
        15_000.0,
        vec![Numerology::N1],
        Connection::Dual {
            legacy: LinkInfo::new(),
            next_gen: LinkInfo::new(),
        },
    );
    add_ue(
        &mut network,
        150.0,
        8_000.0,
        Vec::new(),
        Connection::LegacyOnly(LinkInfo::new()),
    );
    add_ue(
        &mut network,
        250.0,
        30_000.0,
        vec![Numerology::N0, Numerology::N3],
        Connection::NextGenOnly(LinkInfo::new()),
    );
    let channel = ChannelModel::new(&network);
    let report = DcRa::default().run(&mut network, &channel);

    let mut total = 0.0;
    for ue in &network.ues {
        if ue.is_allocated {
            assert!(
                ue.throughput >= ue.request_rate,
                "UE {} under-served: {} < {}",
                ue.id.0,
                ue.throughput,
                ue.request_rate
            );
            total += ue.throughput;
        } else {
            assert_eq!(ue.throughput, 0.0);
        }
    }
    assert_eq!(report.system_throughput, total);
    assert_eq!(
        report.allocated.len() + report.unallocated.len(),
        network.ues.len()
    );
}

#[test]
fn identical_scenarios_produce_identical_runs() {
    let build = || {
        let mut network = topology(2, 40);
        add_ue(
            &mut network,
            80.0,
            12_000.0,
            vec![Numerology::N1, Numerology::N2],
            Connection::NextGenOnly(LinkInfo::new()),
        );
        add_ue(
            &mut network,
            110.0,
            18_000.0,
            vec![Numerology::N2],
            Connection::Dual {
                legacy: LinkInfo::new(),
                next_gen: LinkInfo::new(),
            },
        );
        network
    };
    for strategy in [
        by_name("dc-ra").unwrap(),
        by_name("intuitive").unwrap(),
        by_name("frsa").unwrap(),
        by_name("msema").unwrap(),
    ] {
        let mut first = build();
        let mut second = build();
        let channel_a = ChannelModel::new(&first);
        let channel_b = ChannelModel::new(&second);
        let a = strategy.run(&mut first, &channel_a);
        let b = strategy.run(&mut second, &channel_b);
        assert_eq!(a.allocated, b.allocated, "{}", strategy.name());
        assert_eq!(a.unallocated, b.unallocated, "{}", strategy.name());
        assert_eq!(a.system_throughput, b.system_throughput, "{}", strategy.name());
        for (x, y) in first.ues.iter().zip(second.ues.iter()) {
            assert_eq!(x, y, "{}", strategy.name());
        }
    }
}
