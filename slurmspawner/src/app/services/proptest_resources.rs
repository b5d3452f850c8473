// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Property tests for per-field override selection.

use proptest::prelude::*;

use super::resources::{MAX_CPUS, MAX_NODES, MAX_TASKS, MAX_WALL_DAYS, select_resources};
use crate::app::types::{ResourceOverrides, ResourceRequest};

/// Values around and well past each bound, negatives included.
fn requested() -> impl Strategy<Value = i64> {
    prop_oneof![-10i64..200, any::<i64>()]
}

fn select(overrides: ResourceOverrides) -> ResourceRequest {
    select_resources(&ResourceRequest::default(), Some(&overrides))
}

/// Fields other than the overridable five never change.
fn fixed_fields_kept(selected: &ResourceRequest) -> bool {
    let defaults = ResourceRequest::default();
    selected.partition == defaults.partition && selected.qos == defaults.qos
}

proptest! {
    #[test]
    fn prop_memory_is_override_or_default(memory in requested()) {
        let selected = select(ResourceOverrides { memory: Some(memory), ..Default::default() });
        let expected = if memory > 0 { memory as u64 } else { ResourceRequest::default().mem };
        prop_assert_eq!(selected.mem, expected);
        prop_assert!(fixed_fields_kept(&selected));
    }

    #[test]
    fn prop_cpus_are_override_or_default(cpus in requested()) {
        let selected = select(ResourceOverrides { cpus: Some(cpus), ..Default::default() });
        let expected = if (1..=MAX_CPUS).contains(&cpus) {
            cpus as u32
        } else {
            ResourceRequest::default().cpus_per_task
        };
        prop_assert_eq!(selected.cpus_per_task, expected);
        prop_assert!(fixed_fields_kept(&selected));
    }

    #[test]
    fn prop_tasks_are_override_or_default(tasks in requested()) {
        let selected = select(ResourceOverrides { tasks: Some(tasks), ..Default::default() });
        let expected = if (1..=MAX_TASKS).contains(&tasks) {
            tasks as u32
        } else {
            ResourceRequest::default().ntasks
        };
        prop_assert_eq!(selected.ntasks, expected);
    }

    #[test]
    fn prop_nodes_are_override_or_default(nodes in requested()) {
        let selected = select(ResourceOverrides { nodes: Some(nodes), ..Default::default() });
        let expected = if (1..=MAX_NODES).contains(&nodes) {
            nodes as u32
        } else {
            ResourceRequest::default().nodes
        };
        prop_assert_eq!(selected.nodes, expected);
    }

    #[test]
    fn prop_well_formed_time_is_override_or_default(
        days in 0u32..40,
        hours in 0u32..100,
        minutes in 0u32..100,
        seconds in 0u32..100,
    ) {
        let time = format!("{days}-{hours:02}:{minutes:02}:{seconds:02}");
        let selected = select(ResourceOverrides { time: Some(time.clone()), ..Default::default() });
        let expected = if days <= MAX_WALL_DAYS { time } else { ResourceRequest::default().time };
        prop_assert_eq!(selected.time, expected);
    }

    #[test]
    fn prop_time_without_day_separator_keeps_default(time in "[^-]*") {
        let selected = select(ResourceOverrides { time: Some(time), ..Default::default() });
        prop_assert_eq!(selected, ResourceRequest::default());
    }

    #[test]
    fn prop_overrides_never_touch_other_fields(cpus in requested()) {
        let selected = select(ResourceOverrides { cpus: Some(cpus), ..Default::default() });
        let defaults = ResourceRequest::default();
        prop_assert_eq!(selected.mem, defaults.mem);
        prop_assert_eq!(selected.ntasks, defaults.ntasks);
        prop_assert_eq!(selected.nodes, defaults.nodes);
        prop_assert_eq!(selected.time, defaults.time);
    }
}
