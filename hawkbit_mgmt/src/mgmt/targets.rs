// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

// Target devices and their assignment actions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mgmt::client::{Client, Error, Resource};
use crate::mgmt::common::{ActionType, PagedResult};

/// Message reported by a device once a software bundle has been installed.
pub const INSTALL_SUCCESS_MESSAGE: &str = "Software bundle installed successfully.";

/// A device managed by the hawkBit server.
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    /// Identifier of the device
    #[serde(rename = "controllerId")]
    pub controller_id: String,
    /// Human readable name
    pub name: String,
    /// Overall provisioning state as reported by the server
    #[serde(rename = "updateStatus")]
    pub update_status: Option<String>,
}

/// Status of an assignment action.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Action created but not picked up yet
    Pending,
    /// Action is being worked on
    Active,
    /// Device is processing the action
    Running,
    /// Action closed successfully
    Finished,
    /// Action was canceled
    Canceled,
    /// Action closed with an error
    Error,
    /// Action closed with a warning
    Warning,
    /// Any other status the server may report
    #[serde(other)]
    Unknown,
}

/// One assignment of a distribution set to a target.
#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    /// Identifier of the action
    pub id: i64,
    /// Current status
    pub status: ActionStatus,
}

/// Type of one entry in an action's status history.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionStateType {
    /// Device finished processing
    Finished,
    /// Device reported an error
    Error,
    /// Device reported a warning
    Warning,
    /// Waiting for the device
    Pending,
    /// Device is processing
    Running,
    /// Device retrieved the action
    Retrieved,
    /// Action was canceled
    Canceled,
    /// Device is downloading
    Download,
    /// Any other entry type the server may report
    #[serde(other)]
    Unknown,
}

/// One entry in an action's status history.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionState {
    /// Type of the entry
    #[serde(rename = "type")]
    pub kind: ActionStateType,
    /// Messages reported by the device for this entry
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Serialize)]
struct NewTarget<'a> {
    #[serde(rename = "controllerId")]
    controller_id: &'a str,
    name: &'a str,
    #[serde(rename = "securityToken", skip_serializing_if = "Option::is_none")]
    security_token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AssignedDistribution {
    id: i64,
    #[serde(rename = "type")]
    action_type: ActionType,
}

#[derive(Debug, Deserialize)]
struct AssignedAction {
    id: i64,
}

/// Reply of a distribution assignment request.
#[derive(Debug, Deserialize)]
pub struct AssignmentReply {
    /// Number of targets the distribution was newly assigned to
    #[serde(default)]
    pub assigned: u32,
    /// Number of targets that already had the distribution assigned
    #[serde(rename = "alreadyAssigned", default)]
    pub already_assigned: u32,
    /// Total number of targets in the request
    #[serde(default)]
    pub total: u32,
    #[serde(rename = "assignedActions", default)]
    assigned_actions: Vec<AssignedAction>,
}

impl Action {
    /// Whether the target owning this action should be reassigned the
    /// distribution set.
    ///
    /// A target is up to date only when the latest status entry reports
    /// `running`, or when the action is `finished` with
    /// [`INSTALL_SUCCESS_MESSAGE`] as its first message. Everything else,
    /// including a missing status history, asks for a reassignment.
    pub fn needs_reassignment(&self, latest_state: Option<&ActionState>) -> bool {
        if let Some(state) = latest_state {
            if state.kind == ActionStateType::Running {
                return false;
            }
            if self.status == ActionStatus::Finished
                && state.messages.first().map(String::as_str) == Some(INSTALL_SUCCESS_MESSAGE)
            {
                return false;
            }
        }
        true
    }
}

impl Client {
    /// Register a new target with `controller_id` as both id and name.
    ///
    /// If `token` is given it is set as the target's security token,
    /// otherwise the server generates one. The created id is remembered as
    /// the default target.
    pub async fn create_target(
        &self,
        controller_id: &str,
        token: Option<&str>,
    ) -> Result<String, Error> {
        let new = [NewTarget {
            controller_id,
            name: controller_id,
            security_token: token,
        }];
        let _: Vec<Target> = self.post("targets", &new).await?;

        self.remember_target(controller_id);
        Ok(controller_id.to_string())
    }

    /// Return the target matching `controller_id`, defaulting to the most
    /// recently created one.
    pub async fn get_target(&self, controller_id: Option<&str>) -> Result<Target, Error> {
        let id = self.target_or_last(controller_id)?;
        self.get(&format!("targets/{}", id)).await
    }

    /// Delete the target matching `controller_id`, defaulting to the most
    /// recently created one.
    pub async fn delete_target(&self, controller_id: Option<&str>) -> Result<(), Error> {
        let id = self.target_or_last(controller_id)?;
        self.delete(&format!("targets/{}", id)).await?;

        self.forget_target(&id);
        Ok(())
    }

    /// Return the attributes reported by the target matching
    /// `controller_id`, defaulting to the most recently created one.
    pub async fn get_attributes(
        &self,
        controller_id: Option<&str>,
    ) -> Result<HashMap<String, String>, Error> {
        let id = self.target_or_last(controller_id)?;
        self.get(&format!("targets/{}/attributes", id)).await
    }

    /// Return all targets matching the RSQL `query`, such as
    /// `attribute.update_channel=="stable"`.
    pub async fn targets_by_filter(&self, query: &str) -> Result<Vec<Target>, Error> {
        let reply: PagedResult<Target> = self.get_with_query("targets", &[("q", query)]).await?;
        Ok(reply.content)
    }

    /// Return the most recent actions of the target matching
    /// `controller_id`, newest first.
    pub async fn target_actions(&self, controller_id: Option<&str>) -> Result<Vec<Action>, Error> {
        let id = self.target_or_last(controller_id)?;
        let reply: PagedResult<Action> = self
            .get_with_query(
                &format!("targets/{}/actions", id),
                &[("limit", "10"), ("sort", "id:DESC")],
            )
            .await?;
        Ok(reply.content)
    }

    /// Return the actions of the target matching `controller_id` that are
    /// still open, i.e. `active` or `pending`.
    pub async fn active_actions(&self, controller_id: &str) -> Result<Vec<Action>, Error> {
        let reply: PagedResult<Action> = self
            .get_with_query(
                &format!("targets/{}/actions", controller_id),
                &[("status", "active,pending")],
            )
            .await?;
        Ok(reply
            .content
            .into_iter()
            .filter(|a| matches!(a.status, ActionStatus::Active | ActionStatus::Pending))
            .collect())
    }

    /// Return the action matching `action_id` on the target matching
    /// `controller_id`, both defaulting to the most recently stored ids.
    pub async fn get_action(
        &self,
        action_id: Option<i64>,
        controller_id: Option<&str>,
    ) -> Result<Action, Error> {
        let action_id = self.id_or_last(action_id, Resource::Action)?;
        let target_id = self.target_or_last(controller_id)?;

        self.get(&format!("targets/{}/actions/{}", target_id, action_id))
            .await
    }

    /// Return the status history of the action matching `action_id` on the
    /// target matching `controller_id`, newest entry first (at most 50).
    pub async fn action_status(
        &self,
        action_id: Option<i64>,
        controller_id: Option<&str>,
    ) -> Result<Vec<ActionState>, Error> {
        let action_id = self.id_or_last(action_id, Resource::Action)?;
        let target_id = self.target_or_last(controller_id)?;

        let reply: PagedResult<ActionState> = self
            .get_with_query(
                &format!("targets/{}/actions/{}/status", target_id, action_id),
                &[("offset", "0"), ("limit", "50"), ("sort", "id:DESC")],
            )
            .await?;
        Ok(reply.content)
    }

    /// Cancel the action matching `action_id` on the target matching
    /// `controller_id`. With `force` the canceled action is additionally
    /// force-quit, closing it without waiting for the device to confirm.
    pub async fn cancel_action(
        &self,
        action_id: Option<i64>,
        controller_id: Option<&str>,
        force: bool,
    ) -> Result<(), Error> {
        let action_id = self.id_or_last(action_id, Resource::Action)?;
        let target_id = self.target_or_last(controller_id)?;

        self.delete(&format!("targets/{}/actions/{}", target_id, action_id))
            .await?;

        // the server only accepts a force quit on an already canceled action
        if force {
            self.delete(&format!(
                "targets/{}/actions/{}?force=true",
                target_id, action_id
            ))
            .await?;
        }
        Ok(())
    }

    /// Assign the distribution set matching `dist_id` to the target matching
    /// `controller_id`, both defaulting to the most recently stored ids.
    ///
    /// The id of the resulting action, if any, is remembered as the default
    /// action.
    pub async fn assign_distribution_set(
        &self,
        controller_id: Option<&str>,
        dist_id: Option<i64>,
        action_type: ActionType,
    ) -> Result<AssignmentReply, Error> {
        let target_id = self.target_or_last(controller_id)?;
        let dist_id = self.id_or_last(dist_id, Resource::DistributionSet)?;

        let assignment = [AssignedDistribution {
            id: dist_id,
            action_type,
        }];
        let reply: AssignmentReply = self
            .post(&format!("targets/{}/assignedDS", target_id), &assignment)
            .await?;

        self.remember_assigned_action(&reply);
        Ok(reply)
    }

    pub(crate) fn remember_assigned_action(&self, reply: &AssignmentReply) {
        if let Some(action) = reply.assigned_actions.last() {
            self.remember(Resource::Action, action.id);
        }
    }

    /// Force-assign the distribution set matching `dist_id` to every target
    /// in `controller_ids`, one request per target.
    ///
    /// A failing target does not abort the batch; each target's outcome is
    /// reported separately in the returned list, in request order.
    pub async fn reassign_distribution_set(
        &self,
        controller_ids: &[String],
        dist_id: i64,
    ) -> Vec<(String, Result<AssignmentReply, Error>)> {
        let mut results = Vec::with_capacity(controller_ids.len());

        for id in controller_ids {
            let res = self
                .assign_distribution_set(Some(id), Some(dist_id), ActionType::Forced)
                .await;
            if let Err(err) = &res {
                log::warn!("failed to reassign distribution to {}: {}", id, err);
            }
            results.push((id.clone(), res));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(status: ActionStatus) -> Action {
        Action { id: 1, status }
    }

    fn state(kind: ActionStateType, messages: Vec<&str>) -> ActionState {
        ActionState {
            kind,
            messages: messages.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn running_target_is_left_alone() {
        let a = action(ActionStatus::Running);
        let s = state(ActionStateType::Running, vec![]);
        assert!(!a.needs_reassignment(Some(&s)));
    }

    #[test]
    fn installed_target_is_left_alone() {
        let a = action(ActionStatus::Finished);
        let s = state(ActionStateType::Finished, vec![INSTALL_SUCCESS_MESSAGE]);
        assert!(!a.needs_reassignment(Some(&s)));
    }

    #[test]
    fn finished_with_other_message_needs_reassignment() {
        let a = action(ActionStatus::Finished);
        let s = state(ActionStateType::Finished, vec!["Update failed"]);
        assert!(a.needs_reassignment(Some(&s)));

        // message must match exactly
        let s = state(
            ActionStateType::Finished,
            vec!["Software bundle installed successfully"],
        );
        assert!(a.needs_reassignment(Some(&s)));
    }

    #[test]
    fn success_message_on_unfinished_action_needs_reassignment() {
        let a = action(ActionStatus::Pending);
        let s = state(ActionStateType::Finished, vec![INSTALL_SUCCESS_MESSAGE]);
        assert!(a.needs_reassignment(Some(&s)));
    }

    #[test]
    fn empty_history_needs_reassignment() {
        let a = action(ActionStatus::Finished);
        assert!(a.needs_reassignment(None));

        let s = state(ActionStateType::Finished, vec![]);
        assert!(a.needs_reassignment(Some(&s)));
    }

    #[test]
    fn unknown_status_deserializes() {
        let a: Action = serde_json::from_str("{\"id\": 5, \"status\": \"canceling\"}").unwrap();
        assert_eq!(a.status, ActionStatus::Unknown);
    }
}
