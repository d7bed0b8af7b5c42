// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

// Staged deployment campaigns

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::mgmt::client::{Client, Error, Resource};
use crate::mgmt::common::{ActionType, PagedResult};

/// A staged deployment of a distribution set to all targets matching a
/// filter query.
#[derive(Debug, Clone, Deserialize)]
pub struct Rollout {
    /// Identifier of the rollout
    pub id: i64,
    /// Name of the rollout
    pub name: String,
    /// Current status as reported by the server
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewRollout<'a> {
    name: &'a str,
    #[serde(rename = "distributionSetId")]
    distribution_set_id: i64,
    #[serde(rename = "targetFilterQuery")]
    target_filter_query: &'a str,
    #[serde(rename = "type")]
    action_type: ActionType,
    weight: u32,
    #[serde(rename = "confirmationRequired")]
    confirmation_required: bool,
    #[serde(rename = "amountGroups")]
    amount_groups: u32,
    #[serde(rename = "startAt", skip_serializing_if = "Option::is_none")]
    start_at: Option<String>,
}

fn now_epoch_secs() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .to_string()
}

impl Client {
    /// Return all rollouts known to the server.
    pub async fn list_rollouts(&self) -> Result<Vec<Rollout>, Error> {
        let reply: PagedResult<Rollout> = self.get("rollouts").await?;
        Ok(reply.content)
    }

    /// Return the rollout with the given `name`, if one exists.
    pub async fn find_rollout(&self, name: &str) -> Result<Option<Rollout>, Error> {
        let rollouts = self.list_rollouts().await?;
        Ok(rollouts.into_iter().find(|r| r.name == name))
    }

    /// Create a forced, single-group rollout of the distribution set
    /// matching `dist_id` against `target_filter_query`. With `auto_start`
    /// the start timestamp is set to now so the server starts it
    /// immediately.
    pub async fn create_rollout(
        &self,
        name: &str,
        dist_id: Option<i64>,
        target_filter_query: &str,
        auto_start: bool,
    ) -> Result<Rollout, Error> {
        let dist_id = self.id_or_last(dist_id, Resource::DistributionSet)?;

        let new = NewRollout {
            name,
            distribution_set_id: dist_id,
            target_filter_query,
            action_type: ActionType::Forced,
            weight: 0,
            confirmation_required: false,
            amount_groups: 1,
            start_at: if auto_start {
                Some(now_epoch_secs())
            } else {
                None
            },
        };

        self.post("rollouts", &new).await
    }

    /// Delete the rollout matching `rollout_id`.
    pub async fn delete_rollout(&self, rollout_id: i64) -> Result<(), Error> {
        self.delete(&format!("rollouts/{}", rollout_id)).await
    }

    /// Replace every rollout on the server with a fresh auto-started one.
    ///
    /// In-flight actions of the targets matching `target_filter_query` are
    /// force-canceled first, then *all* existing rollouts are deleted,
    /// regardless of name or channel, and the new rollout is created. On a
    /// server shared between release channels this wipes the other channels'
    /// campaigns too.
    ///
    /// Returns `None` without touching the existing rollouts when no target
    /// matches the filter query.
    pub async fn replace_rollouts(
        &self,
        name: &str,
        dist_id: Option<i64>,
        target_filter_query: &str,
        auto_start: bool,
    ) -> Result<Option<Rollout>, Error> {
        let targets = self.targets_by_filter(target_filter_query).await?;

        if targets.is_empty() {
            log::info!(
                "no target matches '{}', skipping rollout creation",
                target_filter_query
            );
            return Ok(None);
        }

        for target in &targets {
            for action in self.active_actions(&target.controller_id).await? {
                log::info!(
                    "canceling active action {} on target {}",
                    action.id,
                    target.controller_id
                );
                if let Err(err) = self
                    .cancel_action(Some(action.id), Some(&target.controller_id), true)
                    .await
                {
                    log::warn!("failed to cancel action {}: {}", action.id, err);
                }
            }
        }

        for rollout in self.list_rollouts().await? {
            log::info!("deleting existing rollout '{}'", rollout.name);
            if let Err(err) = self.delete_rollout(rollout.id).await {
                log::warn!("failed to delete rollout {}: {}", rollout.id, err);
            }
        }

        let rollout = self
            .create_rollout(name, dist_id, target_filter_query, auto_start)
            .await?;
        Ok(Some(rollout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollout_payload() {
        let new = NewRollout {
            name: "bundle.raucb",
            distribution_set_id: 3,
            target_filter_query: "attribute.update_channel==\"stable\"",
            action_type: ActionType::Forced,
            weight: 0,
            confirmation_required: false,
            amount_groups: 1,
            start_at: Some("1700000000".to_string()),
        };

        let json = serde_json::to_value(&new).unwrap();
        assert_eq!(json["distributionSetId"], 3);
        assert_eq!(json["type"], "forced");
        assert_eq!(json["amountGroups"], 1);
        assert_eq!(json["confirmationRequired"], false);
        assert_eq!(json["startAt"], "1700000000");
    }

    #[test]
    fn start_at_omitted_without_auto_start() {
        let new = NewRollout {
            name: "bundle.raucb",
            distribution_set_id: 3,
            target_filter_query: "attribute.update_channel==\"stable\"",
            action_type: ActionType::Forced,
            weight: 0,
            confirmation_required: false,
            amount_groups: 1,
            start_at: None,
        };

        let json = serde_json::to_value(&new).unwrap();
        assert!(json.get("startAt").is_none());
    }
}
