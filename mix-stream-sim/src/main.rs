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


mod config;

use crate::config::Config;
use clap::Parser;
use integration_test_utils::{ClusterWorker, TestCluster};
use mix_stream::{StreamError, StreamStats};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use tracing::{info, warn};

#[derive(Parser)]
#[command()]
struct SimArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

#[derive(Serialize, Deserialize)]
struct SimItem {
    sequence: u64,
    payload: Vec<u8>,
}

#[derive(Serialize)]
struct RoundReport {
    stream_id: u64,
    items_per_source: Vec<usize>,
    sources_in_order: bool,
    stats: Option<StreamStats>,
}

#[derive(Serialize)]
struct WorkerReport {
    host: usize,
    worker: usize,
    rounds: Vec<RoundReport>,
}

fn run_round(worker: &ClusterWorker, round: usize, config: &Config) -> Result<RoundReport, StreamError> {
    let stream = worker
        .multiplexer
        .get_new_mix_stream(worker.worker, round)?;

    let mut writers = stream.get_writers()?;
    for sequence in 0..config.workload.items_per_destination as u64 {
        let item = SimItem {
            sequence,
            payload: vec![worker.global_worker() as u8; config.workload.payload_bytes],
        };
        for writer in writers.iter_mut() {
            writer.put(&item)?;
        }
    }
    for writer in writers.iter_mut() {
        writer.close()?;
    }

    let num_workers = worker.multiplexer.num_workers();
    let mut items_per_source = vec![0; num_workers];
    let mut next_sequence = vec![0u64; num_workers];
    let mut sources_in_order = true;
    for mix_block in stream.get_reader(config.workload.consume)? {
        for item in mix_block.block.decode_items::<SimItem>()? {
            sources_in_order &= item.sequence == next_sequence[mix_block.source];
            next_sequence[mix_block.source] = item.sequence + 1;
            items_per_source[mix_block.source] += 1;
        }
    }

    Ok(RoundReport {
        stream_id: stream.id().value(),
        items_per_source,
        sources_in_order,
        stats: stream.close(),
    })
}

fn main() -> Result<(), StreamError> {
    integration_test_utils::init_logging();

    info!("Started mix-stream-sim");

    let args = SimArgs::parse();
    let mut file = File::open(args.config)
        .map_err(|e| StreamError::InvalidConfig(format!("File not found: {e:?}")))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| StreamError::InvalidConfig(format!("Unable to read config file: {e:?}")))?;

    let config: Config = json5::from_str(&contents)
        .map_err(|e| StreamError::InvalidConfig(format!("Unable to parse config file: {e:?}")))?;

    let cluster = TestCluster::with_limits(
        config.topology.num_hosts,
        config.topology.workers_per_host,
        config.topology.hard_ram_limit,
        config.topology.egress_queue_size,
    )?;
    info!(
        num_hosts = cluster.num_hosts(),
        workers_per_host = cluster.workers_per_host(),
        block_size = cluster.multiplexer(0).block_size(),
        "built simulated cluster"
    );

    let worker_config = config.clone();
    let reports = cluster.run_on_workers(move |worker| -> Result<WorkerReport, StreamError> {
        let rounds = (0..worker_config.workload.rounds)
            .map(|round| run_round(&worker, round, &worker_config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkerReport {
            host: worker.host,
            worker: worker.worker,
            rounds,
        })
    });

    for report in reports {
        let report = report?;
        if report.rounds.iter().any(|round| !round.sources_in_order) {
            warn!(
                host = report.host,
                worker = report.worker,
                "received items out of per-source order"
            );
        }
        match serde_json::to_string(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("unable to serialize worker report: {e:?}"),
        }
    }

    for (host, multiplexer) in cluster.multiplexers().iter().enumerate() {
        info!(
            host,
            max_active_streams = multiplexer.max_active_streams(),
            registered_streams = multiplexer.registered_streams(),
            "host summary"
        );
    }

    Ok(())
}
