// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// Paged list reply used by all Management API collection endpoints.
#[derive(Debug, Deserialize)]
pub struct PagedResult<T> {
    /// Entries of the requested page
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    /// Total number of entries on the server
    #[serde(default)]
    pub total: u32,
}

/// How an assignment is enforced on the target.
#[derive(Debug, Deserialize, Serialize, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Target applies the update immediately
    Forced,
    /// Target may delay the update
    Soft,
    /// Soft until a forced time is reached
    TimeForced,
    /// Only download, do not install
    DownloadOnly,
}
