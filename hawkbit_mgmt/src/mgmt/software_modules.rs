// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

// Software modules and their artifacts

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mgmt::client::{Client, Error, ProgressObserver, Resource};
use crate::mgmt::common::PagedResult;

/// A named, versioned, typed container of artifacts.
#[derive(Debug, Clone, Deserialize)]
pub struct SoftwareModule {
    /// Identifier of the module
    pub id: i64,
    /// Name of the module
    pub name: String,
    /// Version of the module
    pub version: String,
    /// Module type, such as `os` or `application`
    #[serde(rename = "type")]
    pub module_type: String,
}

/// A binary file attached to a software module.
#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    /// Identifier of the artifact
    pub id: i64,
    /// File name the artifact was uploaded with
    #[serde(rename = "providedFilename")]
    pub provided_filename: Option<String>,
    /// Size of the file in bytes
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Serialize)]
struct NewSoftwareModule<'a> {
    name: &'a str,
    version: &'a str,
    #[serde(rename = "type")]
    module_type: &'a str,
}

impl Client {
    /// Create a new software module. The created id is remembered as the
    /// default software module.
    pub async fn create_software_module(
        &self,
        name: &str,
        module_type: &str,
        version: &str,
    ) -> Result<i64, Error> {
        let new = [NewSoftwareModule {
            name,
            version,
            module_type,
        }];
        let reply: Vec<SoftwareModule> = self.post("softwaremodules", &new).await?;

        let id = reply
            .first()
            .map(|m| m.id)
            .ok_or(Error::NoneOnServer(Resource::SoftwareModule))?;
        self.remember(Resource::SoftwareModule, id);
        Ok(id)
    }

    /// Return the software module with the given `name` and `module_type`,
    /// if one exists.
    pub async fn find_software_module(
        &self,
        name: &str,
        module_type: &str,
    ) -> Result<Option<SoftwareModule>, Error> {
        let reply: PagedResult<SoftwareModule> = self.get("softwaremodules").await?;
        Ok(reply
            .content
            .into_iter()
            .find(|m| m.name == name && m.module_type == module_type))
    }

    /// Create a software module, or reuse an existing one with the same name
    /// and type instead of creating a duplicate. Re-running an upload with
    /// unchanged inputs is therefore safe.
    ///
    /// The resulting id is remembered as the default software module.
    pub async fn create_or_reuse_software_module(
        &self,
        name: &str,
        module_type: &str,
        version: &str,
    ) -> Result<i64, Error> {
        if let Some(existing) = self.find_software_module(name, module_type).await? {
            log::info!("software module '{}' already exists, reusing it", name);
            self.remember(Resource::SoftwareModule, existing.id);
            return Ok(existing.id);
        }

        self.create_software_module(name, module_type, version).await
    }

    /// Return the software module matching `module_id`, defaulting to the
    /// most recently created one.
    pub async fn get_software_module(
        &self,
        module_id: Option<i64>,
    ) -> Result<SoftwareModule, Error> {
        let id = self.id_or_last(module_id, Resource::SoftwareModule)?;
        self.get(&format!("softwaremodules/{}", id)).await
    }

    /// Delete the software module matching `module_id`, defaulting to the
    /// most recently created one.
    pub async fn delete_software_module(&self, module_id: Option<i64>) -> Result<(), Error> {
        let id = self.id_or_last(module_id, Resource::SoftwareModule)?;
        self.delete(&format!("softwaremodules/{}", id)).await?;

        self.forget(Resource::SoftwareModule, id);
        Ok(())
    }

    /// Return all artifacts attached to the software module matching
    /// `module_id`, defaulting to the most recently created one.
    pub async fn list_artifacts(&self, module_id: Option<i64>) -> Result<Vec<Artifact>, Error> {
        let id = self.id_or_last(module_id, Resource::SoftwareModule)?;
        self.get(&format!("softwaremodules/{}/artifacts", id)).await
    }

    /// Upload `file` as a new artifact of the software module matching
    /// `module_id`, defaulting to the most recently created one.
    ///
    /// The created id is remembered as the default artifact.
    pub async fn upload_artifact(
        &self,
        file: &Path,
        module_id: Option<i64>,
        progress: Option<ProgressObserver>,
    ) -> Result<i64, Error> {
        let id = self.id_or_last(module_id, Resource::SoftwareModule)?;
        let artifact: Artifact = self
            .upload(&format!("softwaremodules/{}/artifacts", id), file, progress)
            .await?;

        self.remember(Resource::Artifact, artifact.id);
        Ok(artifact.id)
    }

    /// Return the artifact matching `artifact_id` of the software module
    /// matching `module_id`, both defaulting to the most recently stored ids.
    pub async fn get_artifact(
        &self,
        artifact_id: Option<i64>,
        module_id: Option<i64>,
    ) -> Result<Artifact, Error> {
        let module_id = self.id_or_last(module_id, Resource::SoftwareModule)?;
        let artifact_id = self.id_or_last(artifact_id, Resource::Artifact)?;

        self.get(&format!(
            "softwaremodules/{}/artifacts/{}",
            module_id, artifact_id
        ))
        .await
    }

    /// Delete the artifact matching `artifact_id` from the software module
    /// matching `module_id`, both defaulting to the most recently stored ids.
    pub async fn delete_artifact(
        &self,
        artifact_id: Option<i64>,
        module_id: Option<i64>,
    ) -> Result<(), Error> {
        let module_id = self.id_or_last(module_id, Resource::SoftwareModule)?;
        let artifact_id = self.id_or_last(artifact_id, Resource::Artifact)?;

        self.delete(&format!(
            "softwaremodules/{}/artifacts/{}",
            module_id, artifact_id
        ))
        .await?;

        self.forget(Resource::Artifact, artifact_id);
        Ok(())
    }

    /// Replace the artifacts of the software module matching `module_id`
    /// with `file`: every existing artifact is deleted first, then the new
    /// one is uploaded.
    ///
    /// The created id is remembered as the default artifact.
    pub async fn replace_artifacts(
        &self,
        file: &Path,
        module_id: Option<i64>,
        progress: Option<ProgressObserver>,
    ) -> Result<i64, Error> {
        let module_id = self.id_or_last(module_id, Resource::SoftwareModule)?;

        for artifact in self.list_artifacts(Some(module_id)).await? {
            log::info!(
                "deleting existing artifact {} ({})",
                artifact.id,
                artifact.provided_filename.as_deref().unwrap_or("unnamed")
            );
            self.delete_artifact(Some(artifact.id), Some(module_id))
                .await?;
        }

        self.upload_artifact(file, Some(module_id), progress).await
    }
}
