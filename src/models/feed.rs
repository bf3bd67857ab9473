use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use super::EntityId;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Like,
    Review,
    Friend,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Add,
    Remove,
    Update,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Like => "LIKE",
            EventType::Review => "REVIEW",
            EventType::Friend => "FRIEND",
        }
    }
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Add => "ADD",
            Operation::Remove => "REMOVE",
            Operation::Update => "UPDATE",
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIKE" => Ok(EventType::Like),
            "REVIEW" => Ok(EventType::Review),
            "FRIEND" => Ok(EventType::Friend),
            other => Err(AppError::Internal(format!("unknown event type {}", other))),
        }
    }
}

impl FromStr for Operation {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Operation::Add),
            "REMOVE" => Ok(Operation::Remove),
            "UPDATE" => Ok(Operation::Update),
            other => Err(AppError::Internal(format!("unknown operation {}", other))),
        }
    }
}

/// Immutable record of a user-caused state change.
///
/// Ids are assigned by the store and strictly increase; events sharing a
/// timestamp are ordered by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    pub event_id: EntityId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub user_id: EntityId,
    pub entity_id: EntityId,
    pub event_type: EventType,
    pub operation: Operation,
}

/// A feed event awaiting id and timestamp assignment by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewFeedEvent {
    pub user_id: EntityId,
    pub entity_id: EntityId,
    pub event_type: EventType,
    pub operation: Operation,
}

impl NewFeedEvent {
    pub fn new(
        user_id: EntityId,
        entity_id: EntityId,
        event_type: EventType,
        operation: Operation,
    ) -> Self {
        Self {
            user_id,
            entity_id,
            event_type,
            operation,
        }
    }

    pub fn into_event(self, event_id: EntityId, timestamp: DateTime<Utc>) -> FeedEvent {
        FeedEvent {
            event_id,
            timestamp,
            user_id: self.user_id,
            entity_id: self.entity_id,
            event_type: self.event_type,
            operation: self.operation,
        }
    }
}
