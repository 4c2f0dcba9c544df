//! End-to-end behaviour of the background rejection filters.

use approx::assert_relative_eq;
use bibfilter_algorithms::{
    run_events, run_events_parallel, AngularBinning, CalibrationMap, CalibrationSource,
    CaloThresholdFilter, ClassifierConfig, DedupFilter, DoubletFilter, DoubletMatcher, EventFilter,
    FilterRegistry, FilterSettings, HitClassifier, RunResources, ThresholdConfig,
    ThresholdEstimator, ThresholdTable, TimeWindow,
};
use bibfilter_core::{BitFieldDecoder, Event, Hit, HitCollection, Position, Relation, Track};
use std::f64::consts::PI;
use std::sync::Arc;

const TRACKER_ENCODING: &str = "system:5,side:-2,layer:6,module:11,sensor:8";
const CALO_ENCODING: &str = "system:5,side:-2,module:8,stave:4,layer:9";

fn at(theta: f64, phi: f64, r: f64) -> Position {
    Position::new(
        r * theta.sin() * phi.cos(),
        r * theta.sin() * phi.sin(),
        r * theta.cos(),
    )
}

fn tracker_hit(layer: i64, theta: f64, phi: f64) -> Hit {
    let decoder = BitFieldDecoder::new(TRACKER_ENCODING).unwrap();
    let cell = decoder
        .encode(&[("layer", layer), ("module", 3), ("sensor", 1)])
        .unwrap();
    Hit::new(cell, at(theta, phi, 30.0 + layer as f64), 1e-5, 0.0)
}

fn calo_hit(layer: i64, theta: f64, energy: f64) -> Hit {
    let decoder = BitFieldDecoder::new(CALO_ENCODING).unwrap();
    let cell = decoder.encode(&[("layer", layer)]).unwrap();
    Hit::new(cell, at(theta, 0.5, 1500.0), energy, 0.0)
}

fn tracker_event(number: i32, hits: Vec<Hit>) -> Event {
    let mut event = Event::new(0, number);
    event.add_hits(
        DoubletFilter::DEFAULT_INPUT,
        HitCollection {
            encoding: TRACKER_ENCODING.into(),
            hits,
        },
    );
    event
}

fn calo_event(number: i32, hits: Vec<Hit>) -> Event {
    let mut event = Event::new(0, number);
    event.add_hits(
        CaloThresholdFilter::DEFAULT_INPUT,
        HitCollection {
            encoding: CALO_ENCODING.into(),
            hits,
        },
    );
    event
}

fn doublet_filter() -> DoubletFilter {
    DoubletFilter::new(
        DoubletMatcher::default(),
        DoubletFilter::DEFAULT_INPUT,
        DoubletFilter::DEFAULT_OUTPUT,
    )
}

fn output_of(event: &Event, name: &str) -> Vec<Hit> {
    event.hit_collection(name).unwrap().hits.clone()
}

#[test]
fn doublet_pair_on_facing_sensors_is_kept() {
    let inner = tracker_hit(2, 0.40, 1.0);
    let outer = tracker_hit(3, 0.4005, 1.0002);
    let mut event = tracker_event(0, vec![inner, outer]);

    let stats = run_events(&mut doublet_filter(), std::iter::once(&mut event)).unwrap();
    assert_eq!(stats.hits_out, 2);
    assert_eq!(
        output_of(&event, DoubletFilter::DEFAULT_OUTPUT),
        vec![inner, outer]
    );
}

#[test]
fn doublet_isolated_hit_is_rejected() {
    let mut event = tracker_event(0, vec![tracker_hit(0, 1.0, 0.2)]);
    run_events(&mut doublet_filter(), std::iter::once(&mut event)).unwrap();
    assert!(output_of(&event, DoubletFilter::DEFAULT_OUTPUT).is_empty());
}

#[test]
fn doublet_is_order_independent() {
    let hits = vec![
        tracker_hit(0, 0.8, 0.1),
        tracker_hit(1, 0.805, 0.1005),
        tracker_hit(2, 1.2, -2.0),
        tracker_hit(3, 1.2001, -2.0003),
        tracker_hit(4, 1.5, 3.0),
        tracker_hit(5, 1.6, 3.0),
    ];
    let mut reversed: Vec<Hit> = hits.clone();
    reversed.reverse();

    let mut forward = tracker_event(0, hits);
    let mut backward = tracker_event(1, reversed);
    let mut filter = doublet_filter();
    run_events(&mut filter, [&mut forward, &mut backward]).unwrap();

    let mut a = output_of(&forward, DoubletFilter::DEFAULT_OUTPUT);
    let mut b = output_of(&backward, DoubletFilter::DEFAULT_OUTPUT);
    let key = |h: &Hit| (h.cell_id, h.position.z.to_bits());
    a.sort_by_key(key);
    b.sort_by_key(key);
    assert_eq!(a.len(), 4);
    assert_eq!(a, b);
}

#[test]
fn doublet_state_does_not_leak_between_events() {
    let mut first = tracker_event(
        0,
        vec![
            tracker_hit(0, 0.5, 0.5),
            tracker_hit(1, 0.5, 0.5),
            tracker_hit(0, 0.9, 0.5),
            tracker_hit(1, 0.9, 0.5),
        ],
    );
    let mut second = tracker_event(1, vec![tracker_hit(0, 0.5, 0.5)]);

    let mut filter = doublet_filter();
    let stats = run_events(&mut filter, [&mut first, &mut second]).unwrap();
    assert_eq!(stats.events_processed, 2);
    assert_eq!(output_of(&first, DoubletFilter::DEFAULT_OUTPUT).len(), 4);
    assert!(output_of(&second, DoubletFilter::DEFAULT_OUTPUT).is_empty());
}

#[test]
fn doublet_is_idempotent() {
    let hits = vec![
        tracker_hit(6, 0.7, 0.0),
        tracker_hit(7, 0.7005, 0.0002),
        tracker_hit(6, 2.0, 1.0),
    ];
    let mut event = tracker_event(0, hits);
    let mut filter = doublet_filter();
    filter.process_event(&mut event).unwrap();
    let once = output_of(&event, DoubletFilter::DEFAULT_OUTPUT);

    let mut again = tracker_event(1, once.clone());
    filter.process_event(&mut again).unwrap();
    assert_eq!(output_of(&again, DoubletFilter::DEFAULT_OUTPUT), once);
}

#[test]
fn self_calibrated_threshold_matches_population_statistics() {
    let config = ThresholdConfig::default().with_n_sigma(3.0);
    let mut estimator = ThresholdEstimator::self_calibrating(config);
    let energies = [0.01, 0.02, 0.015, 0.03];
    let thetas = [0.3; 4];
    let layers = [5; 4];

    let table = estimator.estimate(&energies, &thetas, &layers);
    let cell = table.lookup(5, 0.3).unwrap();
    assert_relative_eq!(cell.correction, 0.01875, epsilon = 1e-12);
    assert_relative_eq!(cell.threshold, 0.040_935_3, epsilon = 1e-6);

    // None of the four hits clears mean + 3 sigma.
    let mut filter = CaloThresholdFilter::new(
        ThresholdEstimator::self_calibrating(ThresholdConfig::default()),
        HitClassifier::default(),
        CaloThresholdFilter::DEFAULT_INPUT,
        CaloThresholdFilter::DEFAULT_OUTPUT,
    );
    let hits = energies.iter().map(|&e| calo_hit(5, 0.3, e)).collect();
    let mut event = calo_event(0, hits);
    filter.process_event(&mut event).unwrap();
    assert!(output_of(&event, CaloThresholdFilter::DEFAULT_OUTPUT).is_empty());
}

#[test]
fn higher_n_sigma_accepts_a_subset() {
    let energies = [0.001, 0.002, 0.0015, 0.003, 0.002, 0.05, 0.0012, 0.009];
    let make_event = || calo_event(0, energies.iter().map(|&e| calo_hit(2, 1.0, e)).collect());

    let accepted = |n_sigma: f64| {
        let config = ThresholdConfig::default().with_n_sigma(n_sigma);
        let mut filter = CaloThresholdFilter::new(
            ThresholdEstimator::self_calibrating(config),
            HitClassifier::new(ClassifierConfig::default().with_correct_energy(false)),
            CaloThresholdFilter::DEFAULT_INPUT,
            CaloThresholdFilter::DEFAULT_OUTPUT,
        );
        let mut event = make_event();
        filter.process_event(&mut event).unwrap();
        output_of(&event, CaloThresholdFilter::DEFAULT_OUTPUT)
    };

    let loose = accepted(0.0);
    let tight = accepted(2.0);
    assert!(!tight.is_empty());
    assert!(tight.len() < loose.len());
    assert!(tight.iter().all(|h| loose.contains(h)));
}

#[test]
fn thresholds_grow_with_n_sigma_in_every_cell() {
    let energies = [0.004, 0.02, 0.011, 0.3, 0.007, 0.05, 0.0, 0.015, 0.09];
    let thetas = [0.2, 0.2, 0.7, 0.7, 0.7, 1.6, 2.5, 2.5, 3.0];
    let layers = [0, 0, 1, 1, 1, 3, 3, 3, 7];

    let table_at = |n_sigma: f64| {
        let config = ThresholdConfig::default()
            .with_n_sigma(n_sigma)
            .with_n_layers(8);
        ThresholdEstimator::self_calibrating(config)
            .estimate(&energies, &thetas, &layers)
            .clone()
    };

    let sigmas = [0.0, 0.5, 1.0, 3.0, 5.0];
    let tables: Vec<ThresholdTable> = sigmas.iter().map(|&n| table_at(n)).collect();
    for pair in tables.windows(2) {
        let (low, high) = (&pair[0], &pair[1]);
        for layer in 0..low.n_layers() {
            for bin in 0..low.n_bins() {
                let a = low.get(layer, bin).unwrap();
                let b = high.get(layer, bin).unwrap();
                assert!(b.threshold >= a.threshold, "layer {layer} bin {bin}");
                assert_relative_eq!(a.correction, b.correction);
            }
        }
    }
    // The populated cells actually move.
    let spread =
        tables[4].lookup(1, 0.7).unwrap().threshold - tables[0].lookup(1, 0.7).unwrap().threshold;
    assert!(spread > 0.0);
}

#[test]
fn time_window_from_settings_gates_calorimeter_hits() {
    let settings = FilterSettings::from_json(
        r#"{
            "threshold": {"flat_threshold": 0.001},
            "classifier": {"time_window": {"min": -0.1, "max": 0.1}}
        }"#,
    )
    .unwrap();
    let resources = RunResources::new(&settings);
    let mut filter = FilterRegistry::with_defaults()
        .create("calo-threshold", &settings, &resources)
        .unwrap();

    let mut on_time = calo_hit(1, 0.9, 0.01);
    on_time.time = TimeWindow::time_of_flight(&on_time);
    let mut late = calo_hit(1, 0.9, 0.01);
    late.time = TimeWindow::time_of_flight(&late) + 0.5;
    let mut early = calo_hit(1, 0.9, 0.01);
    early.time = TimeWindow::time_of_flight(&early) - 0.2;

    let mut event = calo_event(0, vec![on_time, late, early]);
    let summary = filter.process_event(&mut event).unwrap();
    assert_eq!(summary.hits_out, 1);

    let out = output_of(&event, CaloThresholdFilter::DEFAULT_OUTPUT);
    assert_relative_eq!(out[0].time, on_time.time);
}

#[test]
fn calibration_map_is_symmetric_in_theta() {
    let binning = AngularBinning::new(vec![0.0, 0.5, 1.0, PI / 2.0]).unwrap();
    let mean = vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]];
    let std_dev = vec![vec![0.01, 0.02], vec![0.03, 0.04], vec![0.05, 0.06]];
    let map = CalibrationMap::new(binning, &mean, &std_dev).unwrap();
    let table = ThresholdTable::from_calibration(&map, &ThresholdConfig::default());

    for theta in [0.1, 0.7, 1.2, 1.5] {
        for layer in 0..2 {
            assert_eq!(
                table.lookup(layer, theta).unwrap(),
                table.lookup(layer, PI - theta).unwrap()
            );
        }
    }
    let cell = table.lookup(1, PI - 0.7).unwrap();
    assert_relative_eq!(cell.threshold, 0.4 + 3.0 * 0.04);
    assert_relative_eq!(cell.correction, 0.4);
}

#[test]
fn calibrated_filter_propagates_relations() {
    let binning = AngularBinning::new(vec![0.0, PI / 2.0]).unwrap();
    let map = CalibrationMap::new(binning, &[vec![0.01; 3]], &[vec![0.001; 3]]).unwrap();
    let settings = FilterSettings {
        input_relations: Some("EcalBarrelRelationsSimRec".into()),
        calibration: Some(CalibrationSource::new("calibration.json")),
        ..FilterSettings::default()
    };
    let resources = RunResources::new(&settings).with_calibration(&map, &settings);
    let mut filter = FilterRegistry::with_defaults()
        .create("calo-threshold", &settings, &resources)
        .unwrap();

    let mut event = calo_event(
        0,
        vec![
            calo_hit(1, 0.4, 0.005),
            calo_hit(1, 2.8, 0.02),
            calo_hit(2, 1.0, 0.1),
        ],
    );
    event.add_relations(
        "EcalBarrelRelationsSimRec",
        vec![
            Relation::new(0, 100, 1.0),
            Relation::new(1, 101, 0.5),
            Relation::new(2, 102, 0.25),
            Relation::new(2, 103, 0.75),
        ],
    );
    filter.process_event(&mut event).unwrap();

    let out = output_of(&event, CaloThresholdFilter::DEFAULT_OUTPUT);
    assert_eq!(out.len(), 2);
    assert_relative_eq!(out[0].energy, 0.01, epsilon = 1e-12);
    assert_relative_eq!(out[1].energy, 0.09, epsilon = 1e-12);

    let relations = event
        .relation_collection(CaloThresholdFilter::DEFAULT_OUTPUT_RELATIONS)
        .unwrap();
    assert_eq!(
        relations,
        &[
            Relation::new(0, 101, 0.5),
            Relation::new(1, 102, 0.25),
            Relation::new(1, 103, 0.75),
        ]
    );
}

#[test]
fn dedup_removes_exactly_the_track_hits() {
    let decoder = BitFieldDecoder::new(TRACKER_ENCODING).unwrap();
    let hit = |layer: i64, u: f64, v: f64| {
        let cell = decoder.encode(&[("layer", layer), ("module", 2)]).unwrap();
        Hit::new(cell, Position::new(u, v, 1.0), 1e-5, 0.0).with_local(u, v)
    };
    let all = vec![
        hit(0, 1.0, 2.0),
        hit(0, 1.5, 2.5),
        hit(1, 1.0, 2.0),
        hit(2, -3.0, 0.5),
        hit(3, 4.0, 4.0),
    ];

    let mut event = Event::new(0, 0);
    event.add_hits(
        DedupFilter::DEFAULT_INPUT,
        HitCollection {
            encoding: TRACKER_ENCODING.into(),
            hits: all.clone(),
        },
    );
    event.tracks.insert(
        DedupFilter::DEFAULT_TRACKS.into(),
        vec![
            Track {
                hits: vec![all[0], all[3]],
            },
            Track {
                hits: vec![all[3]],
            },
        ],
    );

    let mut filter = DedupFilter::new(
        DedupFilter::DEFAULT_INPUT,
        DedupFilter::DEFAULT_TRACKS,
        DedupFilter::DEFAULT_OUTPUT,
    );
    let stats = run_events(&mut filter, std::iter::once(&mut event)).unwrap();

    assert_eq!(stats.hits_out, 3);
    assert_eq!(
        output_of(&event, DedupFilter::DEFAULT_OUTPUT),
        vec![all[1], all[2], all[4]]
    );
}

#[test]
fn missing_collection_skips_only_that_event() {
    let mut events = vec![
        tracker_event(0, vec![tracker_hit(0, 0.5, 0.5), tracker_hit(1, 0.5, 0.5)]),
        Event::new(0, 1),
        tracker_event(2, vec![tracker_hit(0, 0.5, 0.5)]),
    ];
    let stats = run_events(&mut doublet_filter(), events.iter_mut()).unwrap();
    assert_eq!(stats.events_processed, 2);
    assert_eq!(stats.events_skipped, 1);
    assert_eq!(stats.hits_in, 3);
    assert_eq!(stats.hits_out, 2);
}

#[test]
fn parallel_run_matches_sequential_run() {
    let mut sequential: Vec<Event> = (0..64)
        .map(|i| {
            let phi = f64::from(i) * 0.05;
            let partner = if i % 3 == 0 { 0.3 } else { 0.0001 };
            tracker_event(
                i,
                vec![
                    tracker_hit(2, 0.6, phi),
                    tracker_hit(3, 0.6 + partner, phi),
                    tracker_hit(4, 1.1, phi),
                ],
            )
        })
        .collect();
    let mut parallel = sequential.clone();

    let seq = run_events(&mut doublet_filter(), sequential.iter_mut()).unwrap();
    let matcher = DoubletMatcher::new(Arc::default());
    let par = run_events_parallel(&mut parallel, || {
        Ok(Box::new(DoubletFilter::new(
            matcher.clone(),
            DoubletFilter::DEFAULT_INPUT,
            DoubletFilter::DEFAULT_OUTPUT,
        )))
    })
    .unwrap();

    assert_eq!(seq, par);
    assert_eq!(seq.hits_out, 2 * 42);
    assert_eq!(sequential, parallel);
}
