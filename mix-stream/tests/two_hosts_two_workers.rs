/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/


mod support;

use mix_stream::{MixBlock, StreamStats};

// h0w0 sends A, B, C to h1w0 over the network and X to h0w1 through loopback.
fn run_two_by_two_exchange() -> Vec<(Vec<MixBlock>, StreamStats)> {
    let cluster = support::make_cluster(2, 2);

    support::within_deadline(move || {
        cluster.run_on_workers(|worker| {
            let stream = worker
                .multiplexer
                .get_new_mix_stream(worker.worker, 7)
                .expect("stream should open");
            let mut writers = stream.get_writers().expect("writers should open");
            assert_eq!(writers.len(), 4);

            if worker.global_worker() == 0 {
                for item in ["A", "B", "C"] {
                    writers[2].put(&item.to_string()).expect("put should succeed");
                }
                writers[1].put(&"X".to_string()).expect("put should succeed");
            }
            for writer in writers.iter_mut() {
                writer.close().expect("writer should close");
            }

            let blocks: Vec<MixBlock> = stream
                .get_reader(true)
                .expect("reader should open")
                .collect();
            let stats = stream.close().expect("first close performs the handshake");
            assert!(stream.closed());
            (blocks, stats)
        })
    })
}

#[test]
fn remote_destination_receives_items_in_emission_order() {
    let results = run_two_by_two_exchange();

    let (blocks, _) = &results[2];
    let by_source = support::items_by_source::<String>(blocks, 4);
    assert_eq!(by_source[0], vec!["A", "B", "C"]);
    assert!(by_source[1..].iter().all(Vec::is_empty));
}

#[test]
fn local_destination_receives_items_through_loopback() {
    let results = run_two_by_two_exchange();

    let (blocks, stats) = &results[1];
    let by_source = support::items_by_source::<String>(blocks, 4);
    assert_eq!(by_source[0], vec!["X"]);
    assert_eq!(stats.rx_int.items, 1);
    assert_eq!(stats.rx_net.items, 0);
}

#[test]
fn other_workers_receive_nothing() {
    let results = run_two_by_two_exchange();

    for global_worker in [0, 3] {
        let (blocks, _) = &results[global_worker];
        assert!(blocks.is_empty(), "worker {global_worker} received {blocks:?}");
    }
}

#[test]
fn sender_statistics_separate_network_and_loopback_traffic() {
    let results = run_two_by_two_exchange();

    let (_, stats) = &results[0];
    assert_eq!(stats.tx_net.items, 3);
    // one data block plus a close sentinel to each remote worker
    assert_eq!(stats.tx_net.blocks, 3);
    assert_eq!(stats.tx_int.items, 1);
    assert_eq!(stats.tx_int.blocks, 1);
}

#[test]
fn loopback_traffic_never_crosses_the_network() {
    let cluster = support::make_cluster(2, 2);
    let network = cluster.network().clone();

    support::within_deadline(move || {
        cluster.run_on_workers(|worker| {
            let stream = worker
                .multiplexer
                .get_new_mix_stream(worker.worker, 0)
                .expect("stream should open");
            for mut writer in stream.get_writers().expect("writers should open") {
                writer.put(&(worker.global_worker() as u64)).expect("put should succeed");
            }
            let items: Vec<u64> = stream
                .get_reader(true)
                .expect("reader should open")
                .collect_items()
                .expect("items should decode");
            stream.close();
            items.len()
        })
    });

    let headers = network.delivered_headers();
    assert!(!headers.is_empty());
    assert!(headers
        .iter()
        .all(|header| header.sender_host != header.receiver_host));
}
