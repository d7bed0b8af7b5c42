// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! # hawkbit_mgmt_mock
//!
//! Mock server implementation of the [Eclipse hawkBit](https://eclipse.dev/hawkbit/)
//! [Management API](https://eclipse.dev/hawkbit/apis/management_api/)
//! using [httpmock](https://crates.io/crates/httpmock).
//!
//! This mock is used to test the `hawkbit_mgmt` crate but can also be useful
//! to test any hawkBit Management API client, see the [`mgmt`] module.

pub mod mgmt;
