//! Connection state resolution.
//!
//! [`ConnectionStateResolver`] derives the operational state of a connection
//! from the current persisted graph plus an explicit map of edge point
//! overrides (the states carried by the triggering topology change):
//!
//! - A **top connection** is `Disabled` if any lower connection resolves to
//!   `Disabled`, else `Enabled`. Lower connections are always re-resolved
//!   (post-order), even when none of their CEPs were touched by the trigger.
//! - A **cross-connection** is `Disabled` if the edge point behind either CEP
//!   is `Disabled`, else `Enabled`. Overrides win over persisted edge points.
//!
//! A connection whose state cannot be determined (missing lower connection or
//! edge point, or no CEPs and no lower connections at all) resolves to
//! "unchanged" and keeps its stored state. A known `Disabled` input still
//! dominates an unknown one.
//!
//! Resolution never writes. The caller decides what to persist from the
//! returned [`Resolution`].

use std::collections::HashMap;

use futures::FutureExt;
use futures::future::BoxFuture;

use lumen_core::{ConnectionId, EdgePointId};

use crate::error::{Error, Result};
use crate::model::{Connection, OperationalState};
use crate::store::GraphStore;

/// Edge point states supplied by a topology change, taking precedence over
/// persisted edge point state.
pub type EdgePointOverrides = HashMap<EdgePointId, OperationalState>;

/// Default bound on lower-connection depth (one hop per layer).
pub const DEFAULT_MAX_LOWER_DEPTH: usize = 4;

/// Derived state for one connection visited during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOutcome {
    /// The connection as read from the store.
    pub connection: Connection,
    /// The derived state, or `None` when it could not be determined.
    pub derived: Option<OperationalState>,
}

impl ConnectionOutcome {
    /// Returns true if the derived state differs from the stored state.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.derived
            .is_some_and(|state| state != self.connection.operational_state)
    }

    /// Returns the connection updated to its derived state, if it changed.
    #[must_use]
    pub fn transitioned(&self) -> Option<Connection> {
        match self.derived {
            Some(state) if state != self.connection.operational_state => {
                Some(self.connection.transitioned(state))
            }
            _ => None,
        }
    }
}

/// Result of resolving one connection and its lower sub-graph.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Derived state of the root, or `None` if it is left unchanged.
    pub state: Option<OperationalState>,
    /// Every visited connection in post-order (lower connections first).
    pub outcomes: Vec<ConnectionOutcome>,
}

impl Resolution {
    /// Returns the visited connections whose state changed.
    pub fn changed(&self) -> impl Iterator<Item = &ConnectionOutcome> {
        self.outcomes.iter().filter(|o| o.is_change())
    }
}

#[derive(Debug, Default)]
struct Walk {
    path: Vec<ConnectionId>,
    memo: HashMap<ConnectionId, Option<OperationalState>>,
    outcomes: Vec<ConnectionOutcome>,
}

impl Walk {
    fn cycle_from(&self, repeated: &ConnectionId) -> Vec<String> {
        let start = self
            .path
            .iter()
            .position(|id| id == repeated)
            .unwrap_or_default();
        self.path
            .iter()
            .skip(start)
            .chain(std::iter::once(repeated))
            .map(ToString::to_string)
            .collect()
    }
}

/// Combines input states: any `Disabled` wins, then any unknown, else `Enabled`.
fn combine(states: impl IntoIterator<Item = Option<OperationalState>>) -> Option<OperationalState> {
    let mut unknown = false;
    for state in states {
        match state {
            Some(OperationalState::Disabled) => return Some(OperationalState::Disabled),
            Some(OperationalState::Enabled) => {}
            None => unknown = true,
        }
    }
    if unknown {
        None
    } else {
        Some(OperationalState::Enabled)
    }
}

/// Derives connection state from persisted state plus edge point overrides.
pub struct ConnectionStateResolver<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    overrides: &'a EdgePointOverrides,
    max_depth: usize,
}

impl<'a, S: GraphStore + ?Sized> ConnectionStateResolver<'a, S> {
    /// Creates a resolver over `store` with the given overrides.
    #[must_use]
    pub fn new(store: &'a S, overrides: &'a EdgePointOverrides) -> Self {
        Self {
            store,
            overrides,
            max_depth: DEFAULT_MAX_LOWER_DEPTH,
        }
    }

    /// Sets the maximum lower-connection depth.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolves `connection` and every connection beneath it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the lower-connection references
    /// loop, [`Error::DepthExceeded`] if they are deeper than the configured
    /// bound, or a storage error if a read fails. Any error aborts resolution
    /// of this sub-graph only.
    pub async fn resolve(&self, connection: &Connection) -> Result<Resolution> {
        let mut walk = Walk::default();
        let state = self.visit(connection.clone(), 0, &mut walk).await?;
        Ok(Resolution {
            state,
            outcomes: walk.outcomes,
        })
    }

    /// Resolves `connection` to a single state, falling back to its stored
    /// state when the inputs are incomplete.
    ///
    /// # Errors
    ///
    /// See [`ConnectionStateResolver::resolve`].
    pub async fn resolve_state(&self, connection: &Connection) -> Result<OperationalState> {
        let resolution = self.resolve(connection).await?;
        Ok(resolution.state.unwrap_or(connection.operational_state))
    }

    fn visit<'b>(
        &'b self,
        connection: Connection,
        depth: usize,
        walk: &'b mut Walk,
    ) -> BoxFuture<'b, Result<Option<OperationalState>>> {
        async move {
            if let Some(state) = walk.memo.get(&connection.id) {
                return Ok(*state);
            }
            if walk.path.contains(&connection.id) {
                return Err(Error::CycleDetected {
                    cycle: walk.cycle_from(&connection.id),
                });
            }
            if depth > self.max_depth {
                return Err(Error::DepthExceeded {
                    connection_id: connection.id.clone(),
                    depth,
                    limit: self.max_depth,
                });
            }

            walk.path.push(connection.id.clone());
            let derived = if connection.lower_connections.is_empty() {
                self.resolve_cross(&connection).await?
            } else {
                let mut states = Vec::with_capacity(connection.lower_connections.len());
                for lower_id in &connection.lower_connections {
                    match self.store.connection(lower_id).await? {
                        Some(lower) => states.push(self.visit(lower, depth + 1, walk).await?),
                        None => {
                            tracing::warn!(
                                connection_id = %connection.id,
                                lower_connection_id = %lower_id,
                                "lower connection not found; state left unchanged unless another lower connection is disabled"
                            );
                            states.push(None);
                        }
                    }
                }
                combine(states)
            };
            walk.path.pop();

            walk.memo.insert(connection.id.clone(), derived);
            walk.outcomes.push(ConnectionOutcome {
                connection,
                derived,
            });
            Ok(derived)
        }
        .boxed()
    }

    async fn resolve_cross(&self, connection: &Connection) -> Result<Option<OperationalState>> {
        if connection.end_points.is_empty() {
            tracing::warn!(
                connection_id = %connection.id,
                layer = %connection.layer,
                "data integrity: connection has neither lower connections nor end points; left unchanged"
            );
            return Ok(None);
        }

        let mut states = Vec::with_capacity(connection.end_points.len());
        for edge_point_id in connection.edge_points() {
            if let Some(state) = self.overrides.get(edge_point_id) {
                states.push(Some(*state));
                continue;
            }
            match self.store.edge_point(edge_point_id).await? {
                Some(edge_point) => states.push(Some(edge_point.operational_state)),
                None => {
                    tracing::warn!(
                        connection_id = %connection.id,
                        edge_point_id = %edge_point_id,
                        "edge point not found"
                    );
                    states.push(None);
                }
            }
        }
        Ok(combine(states))
    }
}
