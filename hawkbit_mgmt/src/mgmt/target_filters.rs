// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

// Saved target queries driving automatic assignment

use serde::{Deserialize, Serialize};

use crate::mgmt::client::{Client, Error, Resource};
use crate::mgmt::common::{ActionType, PagedResult};

/// A named, saved query over target attributes, optionally bound to an
/// auto-assign distribution set.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetFilter {
    /// Identifier of the filter
    pub id: i64,
    /// Name of the filter
    pub name: String,
    /// RSQL query the filter matches targets with
    pub query: String,
    /// Distribution set automatically assigned to matching targets
    #[serde(rename = "autoAssignDistributionSet")]
    pub auto_assign_distribution_set: Option<i64>,
}

#[derive(Debug, Serialize)]
struct NewTargetFilter<'a> {
    name: &'a str,
    query: &'a str,
}

#[derive(Debug, Serialize)]
struct AutoAssignRequest {
    id: i64,
    #[serde(rename = "type")]
    action_type: ActionType,
    weight: u32,
    #[serde(rename = "confirmationRequired")]
    confirmation_required: bool,
}

impl Client {
    /// Return the saved target filters, at most the first 100.
    pub async fn list_target_filters(&self) -> Result<Vec<TargetFilter>, Error> {
        let reply: PagedResult<TargetFilter> = self
            .get_with_query("targetfilters", &[("limit", "100")])
            .await?;
        Ok(reply.content)
    }

    /// Create a new target filter matching targets with the RSQL `query`.
    /// The created id is remembered as the default target filter.
    pub async fn create_target_filter(
        &self,
        name: &str,
        query: &str,
    ) -> Result<TargetFilter, Error> {
        let new = NewTargetFilter { name, query };
        let filter: TargetFilter = self.post("targetfilters", &new).await?;

        self.remember(Resource::TargetFilter, filter.id);
        Ok(filter)
    }

    /// Return the target filter matching `filter_id`, defaulting to the most
    /// recently created one.
    pub async fn get_target_filter(&self, filter_id: Option<i64>) -> Result<TargetFilter, Error> {
        let id = self.id_or_last(filter_id, Resource::TargetFilter)?;
        self.get(&format!("targetfilters/{}", id)).await
    }

    /// Bind, or update, the distribution set the filter matching `filter_id`
    /// automatically assigns to its targets.
    pub async fn set_auto_assign(
        &self,
        filter_id: Option<i64>,
        dist_id: Option<i64>,
        action_type: ActionType,
    ) -> Result<(), Error> {
        let filter_id = self.id_or_last(filter_id, Resource::TargetFilter)?;
        let dist_id = self.id_or_last(dist_id, Resource::DistributionSet)?;

        let req = AutoAssignRequest {
            id: dist_id,
            action_type,
            weight: 0,
            confirmation_required: false,
        };
        let _: serde_json::Value = self
            .post(&format!("targetfilters/{}/autoAssignDS", filter_id), &req)
            .await?;
        Ok(())
    }

    /// Make sure a filter with exactly the RSQL `query` exists and
    /// auto-assigns the distribution set matching `dist_id`.
    ///
    /// An existing filter with a matching query gets its auto-assign binding
    /// updated; otherwise a new filter called `name` is created and bound.
    /// Re-running never creates a second filter with the same query.
    pub async fn ensure_filter(
        &self,
        query: &str,
        name: &str,
        dist_id: Option<i64>,
        action_type: ActionType,
    ) -> Result<TargetFilter, Error> {
        let filters = self.list_target_filters().await?;

        let filter = match filters.into_iter().find(|f| f.query == query) {
            Some(existing) => {
                log::info!(
                    "filter '{}' already matches query '{}', updating it",
                    existing.name,
                    query
                );
                self.remember(Resource::TargetFilter, existing.id);
                existing
            }
            None => self.create_target_filter(name, query).await?,
        };

        self.set_auto_assign(Some(filter.id), dist_id, action_type)
            .await?;
        Ok(filter)
    }
}
