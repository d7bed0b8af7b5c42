// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

// Report the update status of every target of a release channel and
// re-trigger the distribution assignment for the stragglers.

use anyhow::Result;
use structopt::StructOpt;

use hawkbit_mgmt::mgmt::Client;

#[derive(StructOpt, Debug)]
#[structopt(name = "hawkbit-monitor-status")]
struct Opt {
    /// hawkBit server host
    host: String,
    /// Management API port (443 enables TLS)
    port: u16,
    /// Management API user
    username: String,
    /// Management API password
    password: String,
    /// Release channel to monitor (e.g. 'nightly')
    channel: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let client = Client::new(&opt.host, opt.port, &opt.username, &opt.password)?;

    let latest = client.latest_distribution_set().await?;
    println!(
        "Latest distribution found: {} (ID: {})",
        latest.name, latest.id
    );

    let query = format!("attribute.update_channel==\"{}\"", opt.channel);
    let targets = client.targets_by_filter(&query).await?;

    println!("Targets with channel '{}':", opt.channel);
    let mut to_update = Vec::new();

    for target in &targets {
        println!("ID: {}, Name: {}", target.controller_id, target.name);

        let actions = client.target_actions(Some(&target.controller_id)).await?;
        match actions.first() {
            Some(action) => {
                let states = client
                    .action_status(Some(action.id), Some(&target.controller_id))
                    .await?;
                let latest_state = states.first();

                match latest_state {
                    Some(state) => println!(
                        "Status: {:?}, latest entry: {:?}, message: {}",
                        action.status,
                        state.kind,
                        state.messages.first().map(String::as_str).unwrap_or("none")
                    ),
                    None => println!("Status: {:?}, no detailed status available", action.status),
                }

                if action.needs_reassignment(latest_state) {
                    to_update.push(target.controller_id.clone());
                }
            }
            None => println!("No actions recorded"),
        }
        println!("--------------------");
    }

    if to_update.is_empty() {
        println!("\nNo targets need updating.");
        return Ok(());
    }

    println!("\nTargets that need updating:");
    for id in &to_update {
        println!("{}", id);
    }

    for (id, result) in client
        .reassign_distribution_set(&to_update, latest.id)
        .await
    {
        match result {
            Ok(reply) => println!(
                "Distribution reassigned to target: {} ({} assigned, {} already assigned)",
                id, reply.assigned, reply.already_assigned
            ),
            Err(err) => println!("Error reassigning distribution to target {}: {}", id, err),
        }
    }

    Ok(())
}
