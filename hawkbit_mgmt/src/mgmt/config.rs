// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

// Tenant configuration endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mgmt::client::{Client, Error};

#[derive(Debug, Serialize)]
struct ConfigUpdate<'a, T: ?Sized> {
    value: &'a T,
}

#[derive(Debug, Deserialize)]
struct ConfigValue {
    value: Value,
}

impl Client {
    /// Change the tenant configuration `value` of the configuration `key`.
    pub async fn set_config<T>(&self, key: &str, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        self.put(
            &format!("system/configs/{}", key),
            &ConfigUpdate { value },
        )
        .await
    }

    /// Return the tenant configuration value of the configuration `key`.
    pub async fn get_config(&self, key: &str) -> Result<Value, Error> {
        let reply: ConfigValue = self.get(&format!("system/configs/{}", key)).await?;
        Ok(reply.value)
    }
}
