// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

// Distribution sets, the deployable unit

use serde::{Deserialize, Serialize};

use crate::mgmt::client::{Client, Error, Resource};
use crate::mgmt::common::PagedResult;
use crate::mgmt::targets::AssignmentReply;

/// A named, versioned bundle of software modules.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionSet {
    /// Identifier of the distribution set
    pub id: i64,
    /// Name of the distribution set
    pub name: String,
    /// Version of the distribution set
    pub version: String,
    /// Distribution type, such as `os` or `app`
    #[serde(rename = "type")]
    pub dist_type: String,
}

#[derive(Debug, Serialize)]
struct NewDistributionSet<'a> {
    name: &'a str,
    description: &'a str,
    version: &'a str,
    modules: Vec<ModuleRef>,
    #[serde(rename = "type")]
    dist_type: &'a str,
}

#[derive(Debug, Serialize)]
struct ModuleRef {
    id: i64,
}

#[derive(Debug, Serialize)]
struct TargetRef<'a> {
    id: &'a str,
}

impl Client {
    /// Create a new distribution set referencing `module_ids`. With an empty
    /// slice the most recently created software module is referenced
    /// instead. The created id is remembered as the default distribution
    /// set.
    pub async fn create_distribution_set(
        &self,
        name: &str,
        description: &str,
        module_ids: &[i64],
        dist_type: &str,
        version: &str,
    ) -> Result<i64, Error> {
        let modules = if module_ids.is_empty() {
            vec![ModuleRef {
                id: self.id_or_last(None, Resource::SoftwareModule)?,
            }]
        } else {
            module_ids.iter().map(|&id| ModuleRef { id }).collect()
        };

        let new = [NewDistributionSet {
            name,
            description,
            version,
            modules,
            dist_type,
        }];
        let reply: Vec<DistributionSet> = self.post("distributionsets", &new).await?;

        let id = reply
            .first()
            .map(|d| d.id)
            .ok_or(Error::NoneOnServer(Resource::DistributionSet))?;
        self.remember(Resource::DistributionSet, id);
        Ok(id)
    }

    /// Return the distribution set with the given `name`, if one exists.
    pub async fn find_distribution_set(
        &self,
        name: &str,
    ) -> Result<Option<DistributionSet>, Error> {
        let reply: PagedResult<DistributionSet> = self.get("distributionsets").await?;
        Ok(reply.content.into_iter().find(|d| d.name == name))
    }

    /// Create a distribution set, or reuse an existing one with the same
    /// name instead of creating a duplicate. Re-running an upload with
    /// unchanged inputs is therefore safe.
    ///
    /// The resulting id is remembered as the default distribution set.
    pub async fn create_or_reuse_distribution_set(
        &self,
        name: &str,
        description: &str,
        module_ids: &[i64],
        dist_type: &str,
        version: &str,
    ) -> Result<i64, Error> {
        if let Some(existing) = self.find_distribution_set(name).await? {
            log::info!("distribution set '{}' already exists, reusing it", name);
            self.remember(Resource::DistributionSet, existing.id);
            return Ok(existing.id);
        }

        self.create_distribution_set(name, description, module_ids, dist_type, version)
            .await
    }

    /// Return the distribution set matching `dist_id`, defaulting to the
    /// most recently created one.
    pub async fn get_distribution_set(
        &self,
        dist_id: Option<i64>,
    ) -> Result<DistributionSet, Error> {
        let id = self.id_or_last(dist_id, Resource::DistributionSet)?;
        self.get(&format!("distributionsets/{}", id)).await
    }

    /// Delete the distribution set matching `dist_id`, defaulting to the
    /// most recently created one.
    pub async fn delete_distribution_set(&self, dist_id: Option<i64>) -> Result<(), Error> {
        let id = self.id_or_last(dist_id, Resource::DistributionSet)?;
        self.delete(&format!("distributionsets/{}", id)).await?;

        self.forget(Resource::DistributionSet, id);
        Ok(())
    }

    /// Return the most recently created distribution set on the server.
    ///
    /// Fails with [`Error::NoneOnServer`] when the server has none.
    pub async fn latest_distribution_set(&self) -> Result<DistributionSet, Error> {
        let reply: PagedResult<DistributionSet> = self
            .get_with_query(
                "distributionsets",
                &[("sort", "createdAt:DESC"), ("limit", "1")],
            )
            .await?;

        reply
            .content
            .into_iter()
            .next()
            .ok_or(Error::NoneOnServer(Resource::DistributionSet))
    }

    /// Assign the distribution set matching `dist_id` to the target matching
    /// `controller_id`, both defaulting to the most recently stored ids.
    ///
    /// The id of the resulting action, if any, is remembered as the default
    /// action.
    pub async fn assign_targets(
        &self,
        dist_id: Option<i64>,
        controller_id: Option<&str>,
    ) -> Result<AssignmentReply, Error> {
        let dist_id = self.id_or_last(dist_id, Resource::DistributionSet)?;
        let target_id = self.target_or_last(controller_id)?;

        let assignment = [TargetRef { id: &target_id }];
        let reply: AssignmentReply = self
            .post(
                &format!("distributionsets/{}/assignedTargets", dist_id),
                &assignment,
            )
            .await?;

        self.remember_assigned_action(&reply);
        Ok(reply)
    }
}
