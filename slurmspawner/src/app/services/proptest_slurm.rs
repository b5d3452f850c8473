// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Property tests for the scheduler output parsers against arbitrary text.

use proptest::prelude::*;

use super::slurm::{
    parse_host_lookup, parse_list_output, parse_node_name, parse_query_output, parse_state,
    parse_submitted_job_id,
};
use crate::app::types::{JobState, JobStatus, ListedJob};

fn blank() -> impl Strategy<Value = String> {
    "[ \t\r\n]{0,16}"
}

proptest! {
    #[test]
    fn prop_parsers_accept_any_text(
        raw in any::<String>(),
        reason in any::<Option<String>>(),
    ) {
        let _ = parse_list_output(&raw);
        let _ = parse_state(&raw);
        let _ = parse_query_output(&raw, reason.as_deref());
        let _ = parse_submitted_job_id(&raw);
        let _ = parse_node_name(&raw);
        let _ = parse_host_lookup(&raw);
    }

    #[test]
    fn prop_blank_output_means_no_job(raw in blank(), reason in blank()) {
        prop_assert_eq!(parse_list_output(&raw), ListedJob::default());
        prop_assert_eq!(parse_query_output(&raw, None), JobStatus::default());
        prop_assert_eq!(parse_query_output(&raw, Some(reason.as_str())), JobStatus::default());
        prop_assert_eq!(parse_submitted_job_id(&raw), None);
        prop_assert_eq!(parse_node_name(&raw), None);
        prop_assert_eq!(parse_host_lookup(&raw), None);
    }

    #[test]
    fn prop_truncated_listing_leaves_missing_fields_empty(
        job_id in "[0-9]{1,8}",
        port in any::<u16>(),
        keep in 0usize..=2,
    ) {
        let port = port.to_string();
        let line = [job_id.as_str(), port.as_str()][..keep].join(" ");
        let listed = parse_list_output(&line);
        prop_assert_eq!(listed.job_id.is_empty(), keep == 0);
        prop_assert_eq!(listed.port.is_empty(), keep < 2);
        prop_assert_eq!(listed.state, JobState::Absent);
        prop_assert!(listed.reason_tokens.is_empty());
    }

    #[test]
    fn prop_only_first_listing_line_counts(
        first in "[0-9]{1,6} [0-9]{1,5} RUNNING None",
        rest in any::<String>(),
    ) {
        let listed = parse_list_output(&format!("{first}\n{rest}"));
        prop_assert_eq!(&listed.state, &JobState::Running);
        prop_assert_eq!(listed.reason_text(), "None");
    }

    #[test]
    fn prop_submission_id_is_last_token(
        job_id in "[0-9]{1,9}",
        cluster in proptest::option::of("[a-z]{1,8}"),
    ) {
        let raw = match &cluster {
            Some(cluster) => format!("Submitted batch job {job_id};{cluster}\n"),
            None => format!("Submitted batch job {job_id}\n"),
        };
        prop_assert_eq!(parse_submitted_job_id(&raw), Some(job_id));
    }
}
