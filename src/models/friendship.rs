//! Friendship state machine.
//!
//! A friendship is stored as up to two directed edges. The pair of edges seen
//! from one user's side collapses into a [`FriendshipState`], and the rules
//! for requesting and removing a friend are pure functions over that state.

use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use super::EntityId;
use crate::error::AppError;

/// Status carried by a directed friendship edge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum FriendshipStatus {
    Requested,
    Approved,
}

impl FriendshipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FriendshipStatus::Requested => "REQUESTED",
            FriendshipStatus::Approved => "APPROVED",
        }
    }
}

impl Display for FriendshipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FriendshipStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(FriendshipStatus::Requested),
            "APPROVED" => Ok(FriendshipStatus::Approved),
            other => Err(AppError::Internal(format!(
                "unknown friendship status {}",
                other
            ))),
        }
    }
}

/// Relationship between `user` and `target`, seen from `user`'s side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipState {
    NoEdge,
    /// `user` asked, `target` has not answered
    Outgoing,
    /// `target` asked, `user` has not answered
    Incoming,
    /// Both edges present and approved
    Mutual,
}

/// A single write against the directed edge table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeChange {
    Put {
        from: EntityId,
        to: EntityId,
        status: FriendshipStatus,
    },
    Delete {
        from: EntityId,
        to: EntityId,
    },
}

impl FriendshipState {
    /// Collapses the edge `user -> target` (`forward`) and `target -> user`
    /// (`backward`) into a state.
    pub fn from_edges(
        forward: Option<FriendshipStatus>,
        backward: Option<FriendshipStatus>,
    ) -> Self {
        match (forward, backward) {
            (None, None) => FriendshipState::NoEdge,
            (Some(FriendshipStatus::Approved), Some(FriendshipStatus::Approved)) => {
                FriendshipState::Mutual
            }
            (_, Some(_)) => FriendshipState::Incoming,
            (Some(_), None) => FriendshipState::Outgoing,
        }
    }

    /// Edge writes for `user` asking `target` to be friends.
    ///
    /// Any edge from `target` back to `user` means the request confirms the
    /// friendship, so both directions become approved. Otherwise a pending
    /// request from `user` is (re)written.
    pub fn on_request(self, user: EntityId, target: EntityId) -> Vec<EdgeChange> {
        match self {
            FriendshipState::Incoming | FriendshipState::Mutual => vec![
                EdgeChange::Put {
                    from: user,
                    to: target,
                    status: FriendshipStatus::Approved,
                },
                EdgeChange::Put {
                    from: target,
                    to: user,
                    status: FriendshipStatus::Approved,
                },
            ],
            FriendshipState::NoEdge | FriendshipState::Outgoing => vec![EdgeChange::Put {
                from: user,
                to: target,
                status: FriendshipStatus::Requested,
            }],
        }
    }
}

/// Edge writes that dissolve any relationship between the two users
pub fn removal(user: EntityId, target: EntityId) -> Vec<EdgeChange> {
    vec![
        EdgeChange::Delete {
            from: user,
            to: target,
        },
        EdgeChange::Delete {
            from: target,
            to: user,
        },
    ]
}
