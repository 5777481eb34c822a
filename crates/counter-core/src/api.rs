//! Request and response bodies shared by the HTTP server and client.

use serde::{Deserialize, Serialize};

use crate::counter::{now_millis, Counter};

/// Successful mutation or lookup of a single counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterResponse {
    pub counter: Counter,
    pub timestamp: i64,
}

impl CounterResponse {
    pub fn new(counter: Counter) -> Self {
        Self {
            counter,
            timestamp: now_millis(),
        }
    }
}

/// Body of `GET /api/counters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterListResponse {
    pub counters: Vec<Counter>,
    pub timestamp: i64,
}

impl CounterListResponse {
    pub fn new(counters: Vec<Counter>) -> Self {
        Self {
            counters,
            timestamp: now_millis(),
        }
    }
}

/// Error body returned with every 4xx/5xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Body of `POST /api/counters/{id}/delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRequest {
    pub delta: i64,
}

/// Body of `PUT /api/colors/{username}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRequest {
    pub color: String,
}

/// A user's color assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserColor {
    pub username: String,
    /// Lowercase `#rrggbb`.
    pub color: String,
}
