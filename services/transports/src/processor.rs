//! Transport route operations.
//!
//! Route and vessel definitions live in the catalog. A tenant's routes are
//! loaded into the registry on first use, each with the schedule built for
//! the day, and from then on only their state changes. State is never
//! driven by commands: [`TransportProcessor::update_states`] reads it off the
//! schedule at the current time of day.

use crate::events::{CharacterCommand, RouteChange, RouteStatus, Topics};
use crate::model::{Route, RouteState};
use crate::route::{RouteDefinition, SharedVessel};
use crate::schedule;
use chrono::{DateTime, Utc};
use realm_core::catalog::Catalog;
use realm_core::emitter::Emitter;
use realm_core::environment::Clock;
use realm_core::event::MessageBuffer;
use realm_core::init_tracker::InitTracker;
use realm_core::peer::MapPeer;
use realm_core::registry::{ContainerKey, TenantRegistry};
use realm_core::{RealmError, RealmResult, Tenant};
use std::sync::Arc;
use uuid::Uuid;

/// Transports service entry point.
#[derive(Clone)]
pub struct TransportProcessor {
    registry: Arc<TenantRegistry<Route>>,
    loaded: Arc<InitTracker<()>>,
    routes: Arc<dyn Catalog<RouteDefinition>>,
    vessels: Arc<dyn Catalog<SharedVessel>>,
    maps: Arc<dyn MapPeer>,
    emitter: Emitter,
    topics: Topics,
    clock: Arc<dyn Clock>,
    world_id: u8,
    channel_id: u8,
}

impl TransportProcessor {
    /// Processor over a fresh registry, counting passengers on world 0
    /// channel 0.
    #[must_use]
    pub fn new(
        routes: Arc<dyn Catalog<RouteDefinition>>,
        vessels: Arc<dyn Catalog<SharedVessel>>,
        maps: Arc<dyn MapPeer>,
        emitter: Emitter,
        topics: Topics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: Arc::new(TenantRegistry::new()),
            loaded: Arc::new(InitTracker::new()),
            routes,
            vessels,
            maps,
            emitter,
            topics,
            clock,
            world_id: 0,
            channel_id: 0,
        }
    }

    /// Count passengers on another field.
    #[must_use]
    pub const fn with_field(mut self, world_id: u8, channel_id: u8) -> Self {
        self.world_id = world_id;
        self.channel_id = channel_id;
        self
    }

    /// The route registry.
    #[must_use]
    pub fn registry(&self) -> &TenantRegistry<Route> {
        &self.registry
    }

    /// Current clock reading.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load a tenant's routes once. Later calls return immediately; a failed
    /// load is retried by the next call.
    ///
    /// # Errors
    ///
    /// Catalog errors and malformed stored routes.
    pub async fn ensure(&self, tenant: &Tenant) -> RealmResult<()> {
        if !self.loaded.try_begin(tenant, ()) {
            return Ok(());
        }
        realm_runtime::metrics::record_initializer_run("transports");
        if let Err(e) = self.reload(tenant).await {
            self.loaded.clear(tenant, ());
            tracing::error!(tenant = %tenant, error = %e, "Transport routes failed to load");
            return Err(e);
        }
        self.loaded.mark_complete(tenant, ());
        Ok(())
    }

    /// Rebuild every schedule of a tenant from the catalog and bring states
    /// up to date. Known routes keep their state until the recompute.
    async fn reload(&self, tenant: &Tenant) -> RealmResult<usize> {
        let definitions = self.routes.all(tenant).await?;
        let vessels = self.vessels.all(tenant).await?;
        let mut schedules = schedule::schedules(&definitions, &vessels)?;
        let count = definitions.len();

        for definition in definitions {
            let trips = schedules.remove(&definition.id).unwrap_or_default();
            let fresh = Route::new(definition, trips);
            let id = fresh.id();
            if self.registry.contains(tenant, &id) {
                self.registry
                    .update(tenant, &id, |current| Ok(fresh.with_state(current.state())))?;
            } else {
                self.registry.insert(tenant, fresh)?;
            }
        }
        tracing::info!(tenant = %tenant, routes = count, vessels = vessels.len(), "Transport routes loaded");
        Ok(self.update_states(tenant, self.now()).await)
    }

    async fn refresh(&self, tenant: &Tenant) -> RealmResult<()> {
        if self.loaded.is_started(tenant, ()) {
            self.reload(tenant).await.map(|_| ())
        } else {
            self.ensure(tenant).await
        }
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    /// Store a route and schedule it.
    ///
    /// # Errors
    ///
    /// Validation on a malformed route, conflict when another route owns the
    /// name; catalog errors.
    pub async fn create_route(&self, tenant: &Tenant, definition: RouteDefinition) -> RealmResult<Route> {
        let definition = definition.prepare()?;
        schedule::trips(&definition, 0, definition.cycle_interval_secs)?;
        if let Some(existing) = self.routes.find_by_key(tenant, &definition.name).await? {
            if existing.id != definition.id {
                return Err(RealmError::Conflict(format!(
                    "route [{}] already exists as [{}]",
                    definition.name, existing.id
                )));
            }
        }
        self.routes.upsert(tenant, definition.clone()).await?;
        tracing::info!(
            tenant = %tenant,
            route_id = %definition.id,
            name = %definition.name,
            "Stored transport route"
        );
        self.refresh(tenant).await?;
        self.registry.get(tenant, &definition.id)
    }

    /// Every shared vessel of a tenant.
    ///
    /// # Errors
    ///
    /// Catalog errors.
    pub async fn vessels(&self, tenant: &Tenant) -> RealmResult<Vec<SharedVessel>> {
        Ok(self.vessels.all(tenant).await?)
    }

    /// Store a shared vessel and reschedule both of its routes.
    ///
    /// # Errors
    ///
    /// Validation on a malformed pairing, not-found for an unknown route,
    /// conflict when the name or a route is already taken by another vessel;
    /// catalog errors.
    pub async fn create_vessel(&self, tenant: &Tenant, vessel: SharedVessel) -> RealmResult<SharedVessel> {
        let vessel = vessel.prepare()?;
        for route_id in [vessel.route_a_id, vessel.route_b_id] {
            if self.routes.get(tenant, route_id).await?.is_none() {
                return Err(RealmError::not_found("transport route", route_id));
            }
        }
        for other in self.vessels.all(tenant).await? {
            if other.id == vessel.id {
                continue;
            }
            if other.name == vessel.name {
                return Err(RealmError::Conflict(format!(
                    "vessel [{}] already exists as [{}]",
                    vessel.name, other.id
                )));
            }
            if other.serves(vessel.route_a_id) || other.serves(vessel.route_b_id) {
                return Err(RealmError::Conflict(format!(
                    "vessel [{}] already serves a route of [{}]",
                    other.name, vessel.name
                )));
            }
        }
        self.vessels.upsert(tenant, vessel.clone()).await?;
        tracing::info!(
            tenant = %tenant,
            vessel_id = %vessel.id,
            route_a = %vessel.route_a_id,
            route_b = %vessel.route_b_id,
            "Stored shared vessel"
        );
        self.refresh(tenant).await?;
        Ok(vessel)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every route of a tenant, ordered by id.
    ///
    /// # Errors
    ///
    /// Load errors.
    pub async fn routes(&self, tenant: &Tenant) -> RealmResult<Vec<Route>> {
        self.ensure(tenant).await?;
        Ok(self.registry.snapshot(tenant))
    }

    /// Routes leaving from a map.
    ///
    /// # Errors
    ///
    /// Load errors.
    pub async fn routes_from(&self, tenant: &Tenant, start_map_id: u32) -> RealmResult<Vec<Route>> {
        let mut routes = self.routes(tenant).await?;
        routes.retain(|r| r.definition().start_map_id == start_map_id);
        Ok(routes)
    }

    /// One route.
    ///
    /// # Errors
    ///
    /// Not-found if the tenant has no such route; load errors.
    pub async fn route(&self, tenant: &Tenant, id: Uuid) -> RealmResult<Route> {
        self.ensure(tenant).await?;
        self.registry.get(tenant, &id)
    }

    /// The route holding a map as staging area or en-route map, if any.
    ///
    /// # Errors
    ///
    /// Load errors.
    pub async fn route_holding(&self, tenant: &Tenant, map_id: u32) -> RealmResult<Option<Route>> {
        self.ensure(tenant).await?;
        Ok(self
            .registry
            .by_container(tenant, &ContainerKey::Map(map_id))
            .into_iter()
            .next())
    }

    // -----------------------------------------------------------------------
    // Schedule
    // -----------------------------------------------------------------------

    /// Move every route of a tenant to the state its schedule dictates at
    /// `now`. Returns how many routes changed.
    ///
    /// Each change publishes `STATE_CHANGED`. Leaving a boarding state for
    /// transit also publishes `DEPARTED`; leaving transit publishes `ARRIVED`.
    pub async fn update_states(&self, tenant: &Tenant, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for route in self.registry.snapshot(tenant) {
            let previous = route.state();
            let next = route.state_at(now);
            if next == previous {
                continue;
            }
            let movement = self.movement(tenant, &route, previous, next).await;
            let result = self
                .emitter
                .emit(tenant, |buffer| {
                    self.registry
                        .update(tenant, &route.id(), |current| Ok(current.with_state(next)))?;
                    self.put_status(buffer, &route, RouteChange::StateChanged { previous, state: next })?;
                    if let Some(change) = movement {
                        self.put_status(buffer, &route, change)?;
                    }
                    Ok(())
                })
                .await;
            match result {
                Ok(()) => {
                    changed += 1;
                    tracing::debug!(
                        tenant = %tenant,
                        route_id = %route.id(),
                        from = previous.as_str(),
                        to = next.as_str(),
                        "Route state changed"
                    );
                },
                Err(e) => {
                    tracing::error!(tenant = %tenant, route_id = %route.id(), error = %e, "Route state update failed");
                },
            }
        }
        changed
    }

    async fn movement(&self, tenant: &Tenant, route: &Route, previous: RouteState, next: RouteState) -> Option<RouteChange> {
        let definition = route.definition();
        match (previous, next) {
            (RouteState::OpenEntry | RouteState::LockedEntry, RouteState::InTransit) => Some(RouteChange::Departed {
                map_id: definition.staging_map_id,
                passengers: self.passengers(tenant, definition.staging_map_id).await,
            }),
            (RouteState::InTransit, _) => {
                let mut passengers = 0_u32;
                for map_id in &definition.en_route_map_ids {
                    passengers = passengers.saturating_add(self.passengers(tenant, *map_id).await);
                }
                Some(RouteChange::Arrived {
                    map_id: definition.destination_map_id,
                    passengers,
                })
            },
            _ => None,
        }
    }

    async fn passengers(&self, tenant: &Tenant, map_id: u32) -> u32 {
        match self
            .maps
            .player_count(tenant, self.world_id, self.channel_id, map_id)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(tenant = %tenant, map_id, error = %e, "Passenger count unavailable");
                0
            },
        }
    }

    // -----------------------------------------------------------------------
    // Characters
    // -----------------------------------------------------------------------

    /// A character logged out on `map_id`. If that map is a route's staging
    /// area or en-route map, the character is sent back to the route's start
    /// map. Returns the route that claimed the map.
    ///
    /// # Errors
    ///
    /// Load and bus errors.
    pub async fn on_logout(
        &self,
        tenant: &Tenant,
        character_id: u32,
        world_id: u8,
        channel_id: u8,
        map_id: u32,
    ) -> RealmResult<Option<Route>> {
        let Some(route) = self.route_holding(tenant, map_id).await? else {
            return Ok(None);
        };
        let start_map_id = route.definition().start_map_id;
        let command = CharacterCommand::change_map(world_id, channel_id, character_id, start_map_id);
        self.emitter
            .emit(tenant, |buffer| {
                buffer.put(&self.topics.character, character_id, &command)?;
                Ok(())
            })
            .await?;
        tracing::info!(
            tenant = %tenant,
            character_id,
            route_id = %route.id(),
            from = map_id,
            to = start_map_id,
            "Returned logged out passenger to the start map"
        );
        Ok(Some(route))
    }

    fn put_status(&self, buffer: &mut MessageBuffer, route: &Route, change: RouteChange) -> RealmResult<()> {
        let event = RouteStatus {
            route_id: route.id(),
            change,
        };
        buffer.put(&self.topics.status, route.id(), &event)?;
        Ok(())
    }
}

impl std::fmt::Debug for TransportProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportProcessor")
            .field("topics", &self.topics)
            .field("world_id", &self.world_id)
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}
