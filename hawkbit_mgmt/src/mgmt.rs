// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

mod client;
mod common;
mod config;
mod distribution_sets;
mod rollouts;
mod software_modules;
mod target_filters;
mod targets;

pub use client::{Client, Error, ErrorBody, ProgressObserver, Resource};
pub use common::{ActionType, PagedResult};
pub use distribution_sets::DistributionSet;
pub use rollouts::Rollout;
pub use software_modules::{Artifact, SoftwareModule};
pub use target_filters::TargetFilter;
pub use targets::{
    Action, ActionState, ActionStateType, ActionStatus, AssignmentReply, Target,
    INSTALL_SUCCESS_MESSAGE,
};
