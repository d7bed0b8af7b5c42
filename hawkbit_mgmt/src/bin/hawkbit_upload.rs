// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

// Upload a firmware bundle, register it as a distribution and roll it out
// to every target of a release channel.

use std::path::PathBuf;

use anyhow::{Context, Result};
use structopt::StructOpt;

use hawkbit_mgmt::mgmt::{ActionType, Client};

#[derive(StructOpt, Debug)]
#[structopt(name = "hawkbit-upload")]
struct Opt {
    /// hawkBit server host
    host: String,
    /// Management API port (443 enables TLS)
    port: u16,
    /// Firmware bundle to add as artifact
    bundle: PathBuf,
    /// Management API user
    username: String,
    /// Management API password
    password: String,
    /// Name of the distribution set
    distribution: String,
    /// Name of the software module to add the artifact to
    software_module: String,
    /// Version of the distribution and module
    version: String,
    /// Release channel to roll out to
    channel: String,
    /// Boot mode requested for the targets
    bootmode: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let client = Client::new(&opt.host, opt.port, &opt.username, &opt.password)?;
    log::debug!("boot mode requested: {}", opt.bootmode);

    client.set_config("pollingTime", "00:00:30").await?;
    client.set_config("pollingOverdueTime", "00:03:00").await?;
    client
        .set_config("authentication.targettoken.enabled", &true)
        .await?;

    println!("Creating or updating software module");
    let module_id = client
        .create_or_reuse_software_module(&opt.software_module, "os", &opt.version)
        .await?;

    println!("Creating distribution set");
    let dist_id = client
        .create_or_reuse_distribution_set(&opt.distribution, "", &[module_id], "os", &opt.version)
        .await?;

    println!("Uploading new artifact and removing all existing ones");
    client
        .replace_artifacts(
            &opt.bundle,
            None,
            Some(Box::new(|sent, total| {
                let percent = if total == 0 { 100 } else { sent * 100 / total };
                println!("{} bytes out of {} sent. ({}%)", sent, total, percent);
            })),
        )
        .await?;

    let query = format!("attribute.update_channel == \"{}\"", opt.channel);
    let filter = client
        .ensure_filter(
            &query,
            &format!("Downloads from {} channel", opt.channel),
            Some(dist_id),
            ActionType::Forced,
        )
        .await?;
    println!("Channel filter is '{}' ({})", filter.name, filter.query);

    let rollout_name = opt
        .bundle
        .file_name()
        .and_then(|n| n.to_str())
        .context("bundle path has no file name")?;

    println!("Creating or replacing rollout: {}", rollout_name);
    println!("Using filter query: {}", filter.query);

    match client
        .replace_rollouts(rollout_name, Some(dist_id), &filter.query, true)
        .await?
    {
        Some(rollout) => println!("Rollout created: {} (id {})", rollout.name, rollout.id),
        None => println!("No rollout was created."),
    }

    println!("finished!");
    Ok(())
}
