// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock of the Management API, driven from tests through expectation
//! helpers. Every expectation asserts the HTTP Basic `Authorization` header
//! of the configured credentials.

use std::rc::Rc;

use httpmock::{
    Method::{DELETE, GET, POST, PUT},
    Mock, MockServer,
};
use serde_json::{json, Value};

/// Build a [`Server`] with custom credentials.
pub struct ServerBuilder {
    username: String,
    password: String,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password: "admin".into(),
        }
    }
}

impl ServerBuilder {
    /// Set the Basic-Auth credentials the server expects on every request.
    pub fn credentials(self, username: &str, password: &str) -> Self {
        let mut builder = self;
        builder.username = username.to_string();
        builder.password = password.to_string();
        builder
    }

    /// Start the mock server.
    pub fn build(self) -> Server {
        Server {
            server: Rc::new(MockServer::start()),
            username: self.username,
            password: self.password,
        }
    }
}

/// A mocked hawkBit Management API server.
pub struct Server {
    /// Expected Basic-Auth user
    pub username: String,
    /// Expected Basic-Auth password
    pub password: String,
    server: Rc<MockServer>,
}

impl Server {
    /// Host the mock server listens on.
    pub fn host(&self) -> String {
        self.server.host()
    }

    /// Port the mock server listens on.
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    fn auth_header(&self) -> String {
        format!(
            "Basic {}",
            base64::encode(format!("{}:{}", self.username, self.password))
        )
    }

    fn rest_path(endpoint: &str) -> String {
        format!("/rest/v1/{}", endpoint)
    }

    /// Expect a GET on `endpoint` (relative to `/rest/v1/`) and reply with
    /// `reply` as JSON.
    pub fn expect_get(&self, endpoint: &str, reply: Value) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            when.method(GET)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth);

            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(reply);
        })
    }

    /// Same as [`Server::expect_get`] but also asserting the given query
    /// parameters.
    pub fn expect_get_with_query(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        reply: Value,
    ) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            let mut when = when
                .method(GET)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth);
            for (key, value) in params {
                when = when.query_param(*key, *value);
            }

            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(reply);
        })
    }

    /// Expect a GET on `endpoint` and reply with the error `status` and
    /// `body`, the way hawkBit reports failures.
    pub fn expect_get_error(&self, endpoint: &str, status: u16, body: Value) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            when.method(GET)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth);

            then.status(status)
                .header("Content-Type", "application/json")
                .json_body(body);
        })
    }

    /// Expect a POST on `endpoint` with exactly the JSON body `expected` and
    /// reply with `reply`.
    pub fn expect_post(&self, endpoint: &str, expected: Value, reply: Value) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            when.method(POST)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth)
                .header("Content-Type", "application/json")
                .json_body(expected);

            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(reply);
        })
    }

    /// Expect a POST on `endpoint` with a JSON body containing at least
    /// `partial` and reply with `reply`. Used for payloads carrying dynamic
    /// fields such as timestamps.
    pub fn expect_post_partial(&self, endpoint: &str, partial: &str, reply: Value) -> Mock<'_> {
        let auth = self.auth_header();
        let partial = partial.to_string();
        self.server.mock(|when, then| {
            when.method(POST)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth)
                .header("Content-Type", "application/json")
                .json_body_partial(&partial);

            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(reply);
        })
    }

    /// Expect a POST on `endpoint`, any JSON body, and reply with the error
    /// `status` and `body`.
    pub fn expect_post_error(&self, endpoint: &str, status: u16, body: Value) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            when.method(POST)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth);

            then.status(status)
                .header("Content-Type", "application/json")
                .json_body(body);
        })
    }

    /// Expect a PUT on `endpoint` with exactly the JSON body `expected`.
    pub fn expect_put(&self, endpoint: &str, expected: Value) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            when.method(PUT)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth)
                .header("Content-Type", "application/json")
                .json_body(expected);

            then.status(200);
        })
    }

    /// Expect a DELETE on `endpoint`.
    pub fn expect_delete(&self, endpoint: &str) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            when.method(DELETE)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth);

            then.status(200);
        })
    }

    /// Same as [`Server::expect_delete`] but also asserting the given query
    /// parameters.
    pub fn expect_delete_with_query(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            let mut when = when
                .method(DELETE)
                .path(Self::rest_path(endpoint))
                .header("Authorization", &auth);
            for (key, value) in params {
                when = when.query_param(*key, *value);
            }

            then.status(200);
        })
    }

    /// Expect a multipart artifact upload on the software module
    /// `module_id` and reply with `reply`.
    pub fn expect_upload(&self, module_id: i64, reply: Value) -> Mock<'_> {
        let auth = self.auth_header();
        self.server.mock(|when, then| {
            when.method(POST)
                .path(Self::rest_path(&format!(
                    "softwaremodules/{}/artifacts",
                    module_id
                )))
                .header("Authorization", &auth);

            then.status(201)
                .header("Content-Type", "application/json")
                .json_body(reply);
        })
    }
}

/// A paged collection reply wrapping `content`.
pub fn page(content: Vec<Value>) -> Value {
    let total = content.len();
    json!({
        "content": content,
        "total": total,
        "size": total,
    })
}

/// A software module representation.
pub fn software_module(id: i64, name: &str, version: &str, module_type: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "version": version,
        "type": module_type,
    })
}

/// An artifact representation.
pub fn artifact(id: i64, filename: &str, size: u64) -> Value {
    json!({
        "id": id,
        "providedFilename": filename,
        "size": size,
    })
}

/// A distribution set representation.
pub fn distribution_set(id: i64, name: &str, version: &str, dist_type: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "version": version,
        "type": dist_type,
    })
}

/// A target representation.
pub fn target(controller_id: &str, name: &str) -> Value {
    json!({
        "controllerId": controller_id,
        "name": name,
        "updateStatus": "registered",
    })
}

/// An action representation.
pub fn action(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
    })
}

/// One entry of an action's status history.
pub fn action_state(kind: &str, messages: &[&str]) -> Value {
    json!({
        "type": kind,
        "messages": messages,
    })
}

/// The reply of a distribution assignment request resulting in the action
/// `action_id`.
pub fn assignment(action_id: i64) -> Value {
    json!({
        "assigned": 1,
        "alreadyAssigned": 0,
        "total": 1,
        "assignedActions": [{ "id": action_id }],
    })
}

/// A target filter representation.
pub fn target_filter(id: i64, name: &str, query: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "query": query,
    })
}

/// A rollout representation.
pub fn rollout(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "status": "ready",
    })
}
