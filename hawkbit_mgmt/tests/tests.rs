// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use reqwest::StatusCode;
use serde_json::json;
use tempdir::TempDir;

use hawkbit_mgmt::mgmt::{ActionType, Client, Error, Resource};
use hawkbit_mgmt_mock::mgmt::{self as mock, Server, ServerBuilder};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn client(server: &Server) -> Client {
    Client::new(
        &server.host(),
        server.port(),
        &server.username,
        &server.password,
    )
    .expect("client creation failed")
}

fn write_bundle(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = File::create(&path).expect("failed to create bundle");
    file.write_all(content).expect("failed to write bundle");
    path
}

#[tokio::test]
async fn tenant_config() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let set = server.expect_put(
        "system/configs/pollingTime",
        json!({ "value": "00:00:30" }),
    );
    client
        .set_config("pollingTime", "00:00:30")
        .await
        .expect("set_config failed");
    assert_eq!(set.hits(), 1);

    server.expect_get("system/configs/pollingTime", json!({ "value": "00:00:30" }));
    let value = client
        .get_config("pollingTime")
        .await
        .expect("get_config failed");
    assert_eq!(value, json!("00:00:30"));
}

#[tokio::test]
async fn software_module_upsert() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let mut none_yet = server.expect_get("softwaremodules", mock::page(vec![]));
    let create = server.expect_post(
        "softwaremodules",
        json!([{ "name": "rootfs", "version": "1.0", "type": "os" }]),
        json!([mock::software_module(10, "rootfs", "1.0", "os")]),
    );

    let id = client
        .create_or_reuse_software_module("rootfs", "os", "1.0")
        .await
        .expect("first upsert failed");
    assert_eq!(id, 10);
    assert_eq!(create.hits(), 1);

    // the second run reuses the module instead of creating a duplicate
    none_yet.delete();
    server.expect_get(
        "softwaremodules",
        mock::page(vec![mock::software_module(10, "rootfs", "1.0", "os")]),
    );

    let id = client
        .create_or_reuse_software_module("rootfs", "os", "1.0")
        .await
        .expect("second upsert failed");
    assert_eq!(id, 10);
    assert_eq!(create.hits(), 1);
}

#[tokio::test]
async fn distribution_set_upsert() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let mut none_yet = server.expect_get("distributionsets", mock::page(vec![]));
    let create = server.expect_post(
        "distributionsets",
        json!([{
            "name": "meticulous",
            "description": "",
            "version": "1.0",
            "modules": [{ "id": 10 }],
            "type": "os",
        }]),
        json!([mock::distribution_set(7, "meticulous", "1.0", "os")]),
    );

    let id = client
        .create_or_reuse_distribution_set("meticulous", "", &[10], "os", "1.0")
        .await
        .expect("first upsert failed");
    assert_eq!(id, 7);
    assert_eq!(create.hits(), 1);

    none_yet.delete();
    server.expect_get(
        "distributionsets",
        mock::page(vec![mock::distribution_set(7, "meticulous", "1.0", "os")]),
    );

    let id = client
        .create_or_reuse_distribution_set("meticulous", "", &[10], "os", "1.0")
        .await
        .expect("second upsert failed");
    assert_eq!(id, 7);
    assert_eq!(create.hits(), 1);
}

#[tokio::test]
async fn default_ids_fail_before_creation() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    // no request is sent; the lookup fails locally
    assert_matches!(
        client.get_software_module(None).await,
        Err(Error::NotYetCreated(Resource::SoftwareModule))
    );
    assert_matches!(
        client.get_distribution_set(None).await,
        Err(Error::NotYetCreated(Resource::DistributionSet))
    );
    assert_matches!(
        client.get_target(None).await,
        Err(Error::NotYetCreated(Resource::Target))
    );
    assert_matches!(
        client
            .create_distribution_set("dist", "", &[], "os", "1.0")
            .await,
        Err(Error::NotYetCreated(Resource::SoftwareModule))
    );
}

#[tokio::test]
async fn server_error_surfaces_status_and_body() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    server.expect_get_error(
        "targets/broken",
        409,
        json!({ "errorCode": "hawkbit.server.error.entity.alreadyExists" }),
    );

    let err = client
        .get_target(Some("broken"))
        .await
        .expect_err("expected a server error");
    assert_matches!(
        &err,
        Error::Server { status, .. } if *status == StatusCode::CONFLICT
    );
    assert!(err.to_string().contains("409"));
    assert!(err
        .to_string()
        .contains("hawkbit.server.error.entity.alreadyExists"));
}

#[tokio::test]
async fn ensure_filter_updates_existing() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let query = "attribute.update_channel == \"stable\"";
    server.expect_get_with_query(
        "targetfilters",
        &[("limit", "100")],
        mock::page(vec![mock::target_filter(
            3,
            "Downloads from stable channel",
            query,
        )]),
    );
    let create = server.expect_post(
        "targetfilters",
        json!({ "name": "Downloads from stable channel", "query": query }),
        mock::target_filter(4, "Downloads from stable channel", query),
    );
    let bind = server.expect_post(
        "targetfilters/3/autoAssignDS",
        json!({ "id": 7, "type": "forced", "weight": 0, "confirmationRequired": false }),
        json!({}),
    );

    let filter = client
        .ensure_filter(query, "Downloads from stable channel", Some(7), ActionType::Forced)
        .await
        .expect("ensure_filter failed");

    // the existing filter is rebound, no duplicate is created
    assert_eq!(filter.id, 3);
    assert_eq!(create.hits(), 0);
    assert_eq!(bind.hits(), 1);
}

#[tokio::test]
async fn ensure_filter_creates_when_missing() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let query = "attribute.update_channel == \"nightly\"";
    server.expect_get_with_query("targetfilters", &[("limit", "100")], mock::page(vec![]));
    let create = server.expect_post(
        "targetfilters",
        json!({ "name": "Downloads from nightly channel", "query": query }),
        mock::target_filter(5, "Downloads from nightly channel", query),
    );
    let bind = server.expect_post(
        "targetfilters/5/autoAssignDS",
        json!({ "id": 7, "type": "forced", "weight": 0, "confirmationRequired": false }),
        json!({}),
    );

    let filter = client
        .ensure_filter(
            query,
            "Downloads from nightly channel",
            Some(7),
            ActionType::Forced,
        )
        .await
        .expect("ensure_filter failed");

    assert_eq!(filter.id, 5);
    assert_eq!(create.hits(), 1);
    assert_eq!(bind.hits(), 1);
}

#[tokio::test]
async fn reassignment_continues_after_error() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let conflict = server.expect_post_error(
        "targets/t1/assignedDS",
        409,
        json!({ "errorCode": "hawkbit.server.error.multiassignment" }),
    );
    let assigned = server.expect_post(
        "targets/t2/assignedDS",
        json!([{ "id": 7, "type": "forced" }]),
        mock::assignment(99),
    );

    let results = client
        .reassign_distribution_set(&["t1".to_string(), "t2".to_string()], 7)
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "t1");
    assert_matches!(
        &results[0].1,
        Err(Error::Server { status, .. }) if *status == StatusCode::CONFLICT
    );
    assert_eq!(results[1].0, "t2");
    let reply = results[1].1.as_ref().expect("t2 assignment failed");
    assert_eq!(reply.assigned, 1);

    assert_eq!(conflict.hits(), 1);
    assert_eq!(assigned.hits(), 1);
}

#[tokio::test]
async fn artifact_replace_deletes_existing_first() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let dir = TempDir::new("hawkbit-mgmt-test").expect("failed to create temp dir");
    let bundle = write_bundle(&dir, "new.raucb", b"new bundle");

    server.expect_get(
        "softwaremodules/10/artifacts",
        json!([mock::artifact(5, "old.raucb", 100)]),
    );
    let delete = server.expect_delete("softwaremodules/10/artifacts/5");
    let upload = server.expect_upload(10, mock::artifact(6, "new.raucb", 10));

    let id = client
        .replace_artifacts(&bundle, Some(10), None)
        .await
        .expect("replace_artifacts failed");

    assert_eq!(id, 6);
    assert_eq!(delete.hits(), 1);
    assert_eq!(upload.hits(), 1);

    // the uploaded artifact is the default one from now on
    server.expect_get(
        "softwaremodules/10/artifacts/6",
        mock::artifact(6, "new.raucb", 10),
    );
    let uploaded = client
        .get_artifact(None, Some(10))
        .await
        .expect("get_artifact failed");
    assert_eq!(uploaded.provided_filename.as_deref(), Some("new.raucb"));
    assert_eq!(uploaded.size, 10);
}

#[tokio::test]
async fn upload_reports_progress() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let dir = TempDir::new("hawkbit-mgmt-test").expect("failed to create temp dir");
    let bundle = write_bundle(&dir, "bundle.raucb", b"12345");

    server.expect_upload(10, mock::artifact(8, "bundle.raucb", 5));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();

    let id = client
        .upload_artifact(
            &bundle,
            Some(10),
            Some(Box::new(move |sent, total| {
                recorded.lock().unwrap().push((sent, total));
            })),
        )
        .await
        .expect("upload failed");

    assert_eq!(id, 8);
    // the whole file fits in one chunk, a single 100% notification
    assert_eq!(*calls.lock().unwrap(), vec![(5, 5)]);
}

#[tokio::test]
async fn latest_distribution_set() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let mut latest = server.expect_get_with_query(
        "distributionsets",
        &[("sort", "createdAt:DESC"), ("limit", "1")],
        mock::page(vec![mock::distribution_set(7, "meticulous", "1.0", "os")]),
    );

    let dist = client
        .latest_distribution_set()
        .await
        .expect("latest_distribution_set failed");
    assert_eq!(dist.id, 7);
    assert_eq!(dist.name, "meticulous");

    // an empty server is reported as such
    latest.delete();
    server.expect_get_with_query(
        "distributionsets",
        &[("sort", "createdAt:DESC"), ("limit", "1")],
        mock::page(vec![]),
    );

    assert_matches!(
        client.latest_distribution_set().await,
        Err(Error::NoneOnServer(Resource::DistributionSet))
    );
}

#[tokio::test]
async fn monitor_action_history() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let query = "attribute.update_channel==\"stable\"";
    server.expect_get_with_query(
        "targets",
        &[("q", query)],
        mock::page(vec![mock::target("t1", "Machine 1")]),
    );
    server.expect_get_with_query(
        "targets/t1/actions",
        &[("limit", "10"), ("sort", "id:DESC")],
        mock::page(vec![mock::action(40, "finished"), mock::action(39, "error")]),
    );
    server.expect_get_with_query(
        "targets/t1/actions/40/status",
        &[("offset", "0"), ("limit", "50"), ("sort", "id:DESC")],
        mock::page(vec![
            mock::action_state("finished", &["Software bundle installed successfully."]),
            mock::action_state("running", &[]),
        ]),
    );

    let targets = client.targets_by_filter(query).await.expect("query failed");
    assert_eq!(targets.len(), 1);

    let actions = client
        .target_actions(Some("t1"))
        .await
        .expect("actions failed");
    let action = actions.first().expect("no action");
    assert_eq!(action.id, 40);

    let states = client
        .action_status(Some(action.id), Some("t1"))
        .await
        .expect("status failed");

    // up to date, nothing to reassign
    assert!(!action.needs_reassignment(states.first()));
}

#[tokio::test]
async fn rollout_replace() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let query = "attribute.update_channel == \"stable\"";
    server.expect_get_with_query(
        "targets",
        &[("q", query)],
        mock::page(vec![mock::target("t1", "Machine 1")]),
    );
    server.expect_get_with_query(
        "targets/t1/actions",
        &[("status", "active,pending")],
        mock::page(vec![mock::action(40, "pending")]),
    );
    // registered first so the plain cancel does not swallow the force quit
    let force_quit = server.expect_delete_with_query("targets/t1/actions/40", &[("force", "true")]);
    let cancel = server.expect_delete("targets/t1/actions/40");
    server.expect_get("rollouts", mock::page(vec![mock::rollout(1, "old.raucb")]));
    let delete = server.expect_delete("rollouts/1");
    let create = server.expect_post_partial(
        "rollouts",
        r#"{ "name": "bundle.raucb", "distributionSetId": 7, "amountGroups": 1 }"#,
        mock::rollout(2, "bundle.raucb"),
    );

    let rollout = client
        .replace_rollouts("bundle.raucb", Some(7), query, true)
        .await
        .expect("replace_rollouts failed")
        .expect("rollout creation was skipped");

    assert_eq!(rollout.id, 2);
    assert_eq!(cancel.hits(), 1);
    assert_eq!(force_quit.hits(), 1);
    assert_eq!(delete.hits(), 1);
    assert_eq!(create.hits(), 1);
}

#[tokio::test]
async fn forced_cancel_quits_after_cancel() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    // registered first so the plain cancel does not swallow the force quit
    let force_quit = server.expect_delete_with_query("targets/t1/actions/40", &[("force", "true")]);
    let cancel = server.expect_delete("targets/t1/actions/40");

    // a plain cancel does not force quit
    client
        .cancel_action(Some(40), Some("t1"), false)
        .await
        .expect("cancel failed");
    assert_eq!(cancel.hits(), 1);
    assert_eq!(force_quit.hits(), 0);

    // a forced cancel first cancels, then force quits the canceled action
    client
        .cancel_action(Some(40), Some("t1"), true)
        .await
        .expect("forced cancel failed");
    assert_eq!(cancel.hits(), 2);
    assert_eq!(force_quit.hits(), 1);
}

#[tokio::test]
async fn active_actions_keeps_only_open_ones() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    server.expect_get_with_query(
        "targets/t1/actions",
        &[("status", "active,pending")],
        mock::page(vec![
            mock::action(42, "active"),
            mock::action(41, "pending"),
            mock::action(40, "finished"),
        ]),
    );

    let actions = client
        .active_actions("t1")
        .await
        .expect("active_actions failed");

    let ids: Vec<i64> = actions.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![42, 41]);
}

#[tokio::test]
async fn rollout_replace_skipped_without_targets() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    let query = "attribute.update_channel == \"empty\"";
    server.expect_get_with_query("targets", &[("q", query)], mock::page(vec![]));
    let list = server.expect_get("rollouts", mock::page(vec![mock::rollout(1, "old.raucb")]));
    let create = server.expect_post_partial(
        "rollouts",
        r#"{ "name": "bundle.raucb" }"#,
        mock::rollout(2, "bundle.raucb"),
    );

    let rollout = client
        .replace_rollouts("bundle.raucb", Some(7), query, true)
        .await
        .expect("replace_rollouts failed");

    // nothing matches, the existing rollouts are left alone
    assert!(rollout.is_none());
    assert_eq!(list.hits(), 0);
    assert_eq!(create.hits(), 0);
}

#[tokio::test]
async fn target_lifecycle() {
    init();

    let server = ServerBuilder::default().build();
    let client = client(&server);

    server.expect_post(
        "targets",
        json!([{ "controllerId": "t1", "name": "t1" }]),
        json!([mock::target("t1", "t1")]),
    );
    server.expect_get("targets/t1", mock::target("t1", "t1"));
    let delete = server.expect_delete("targets/t1");

    client
        .create_target("t1", None)
        .await
        .expect("create_target failed");

    // the created id is the default target from now on
    let target = client.get_target(None).await.expect("get_target failed");
    assert_eq!(target.controller_id, "t1");

    client
        .delete_target(None)
        .await
        .expect("delete_target failed");
    assert_eq!(delete.hits(), 1);

    // deletion clears the stored default
    assert_matches!(
        client.get_target(None).await,
        Err(Error::NotYetCreated(Resource::Target))
    );
}
