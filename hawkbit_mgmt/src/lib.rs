// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client side API to drive the [Eclipse hawkBit](https://eclipse.dev/hawkbit/)
//! [Management API](https://eclipse.dev/hawkbit/apis/management_api/), along
//! with the `hawkbit-upload` and `hawkbit-monitor-status` operator tools
//! built on top of it.

pub mod mgmt;

pub use mgmt::{Client, Error};
