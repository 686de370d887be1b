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


use serde::{Deserialize, Serialize};

fn default_rounds() -> usize {
    1
}

fn default_consume() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub(crate) topology: Topology,
    pub(crate) workload: Workload,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    pub(crate) num_hosts: usize,
    pub(crate) workers_per_host: usize,
    pub(crate) hard_ram_limit: usize,
    #[serde(default)]
    pub(crate) egress_queue_size: Option<usize>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Workload {
    pub(crate) items_per_destination: usize,
    pub(crate) payload_bytes: usize,
    #[serde(default = "default_rounds")]
    pub(crate) rounds: usize,
    #[serde(default = "default_consume")]
    pub(crate) consume: bool,
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn bundled_config_parses() {
        let config: Config = json5::from_str(include_str!("../config/sim.json5"))
            .expect("bundled config should parse");

        assert_eq!(config.topology.num_hosts, 2);
        assert!(config.workload.consume);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = json5::from_str::<Config>(
            r#"{
                topology: { num_hosts: 1, workers_per_host: 1, hard_ram_limit: 1024, extra: 1 },
                workload: { items_per_destination: 1, payload_bytes: 0 },
            }"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn optional_fields_take_defaults() {
        let config: Config = json5::from_str(
            r#"{
                topology: { num_hosts: 1, workers_per_host: 1, hard_ram_limit: 1024 },
                workload: { items_per_destination: 1, payload_bytes: 0 },
            }"#,
        )
        .expect("config should parse");

        assert_eq!(config.workload.rounds, 1);
        assert!(config.workload.consume);
        assert!(config.topology.egress_queue_size.is_none());
    }
}
