//! Instanced transport operations.
//!
//! Instanced routes are loaded from the catalog into a registry on first use,
//! like scheduled routes. Voyages live only in memory: a restart loses them,
//! and characters who log back in on a transit map are sent to its route's
//! start map.

use crate::events::{CharacterCommand, InstanceChange, InstanceTransportEvent, StartBody, Topics};
use crate::voyage::{Due, InstanceRoute, Passenger, Voyage, VoyageState};
use chrono::{DateTime, Utc};
use realm_core::catalog::Catalog;
use realm_core::emitter::Emitter;
use realm_core::environment::Clock;
use realm_core::event::MessageBuffer;
use realm_core::init_tracker::InitTracker;
use realm_core::registry::{ContainerKey, TenantRegistry};
use realm_core::{RealmError, RealmResult, Tenant};
use std::sync::Arc;
use uuid::Uuid;

/// Cancellation reason when a passenger walks off the transit maps.
pub const REASON_MAP_EXIT: &str = "map_exit";
/// Cancellation reason when a passenger logs out.
pub const REASON_LOGOUT: &str = "logout";
/// Cancellation reason when a voyage outlives its route's maximum lifetime.
pub const REASON_STUCK: &str = "stuck";

/// Instanced transports entry point.
#[derive(Clone)]
pub struct InstanceTransportProcessor {
    routes: Arc<TenantRegistry<InstanceRoute>>,
    voyages: Arc<TenantRegistry<Voyage>>,
    loaded: Arc<InitTracker<()>>,
    catalog: Arc<dyn Catalog<InstanceRoute>>,
    emitter: Emitter,
    topics: Topics,
    clock: Arc<dyn Clock>,
}

impl InstanceTransportProcessor {
    /// Processor over fresh registries.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog<InstanceRoute>>, emitter: Emitter, topics: Topics, clock: Arc<dyn Clock>) -> Self {
        Self {
            routes: Arc::new(TenantRegistry::new()),
            voyages: Arc::new(TenantRegistry::new()),
            loaded: Arc::new(InitTracker::new()),
            catalog,
            emitter,
            topics,
            clock,
        }
    }

    /// The voyage registry.
    #[must_use]
    pub fn voyages(&self) -> &TenantRegistry<Voyage> {
        &self.voyages
    }

    /// Current clock reading.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Routes
    // -----------------------------------------------------------------------

    /// Load a tenant's instanced routes once. A failed load is retried by
    /// the next call.
    ///
    /// # Errors
    ///
    /// Catalog errors and malformed stored routes.
    pub async fn ensure(&self, tenant: &Tenant) -> RealmResult<()> {
        if !self.loaded.try_begin(tenant, ()) {
            return Ok(());
        }
        realm_runtime::metrics::record_initializer_run("instance-transports");
        if let Err(e) = self.load(tenant).await {
            self.loaded.clear(tenant, ());
            tracing::error!(tenant = %tenant, error = %e, "Instanced routes failed to load");
            return Err(e);
        }
        self.loaded.mark_complete(tenant, ());
        Ok(())
    }

    async fn load(&self, tenant: &Tenant) -> RealmResult<()> {
        let routes = self.catalog.all(tenant).await?;
        let count = routes.len();
        for route in routes {
            self.store(tenant, route)?;
        }
        tracing::info!(tenant = %tenant, routes = count, "Instanced routes loaded");
        Ok(())
    }

    fn store(&self, tenant: &Tenant, route: InstanceRoute) -> RealmResult<InstanceRoute> {
        if self.routes.contains(tenant, &route.id) {
            self.routes.update(tenant, &route.id, |_| Ok(route.clone()))
        } else {
            self.routes.insert(tenant, route)
        }
    }

    /// Store an instanced route.
    ///
    /// # Errors
    ///
    /// Validation on a malformed route, conflict when another route owns the
    /// name; catalog errors.
    pub async fn create_route(&self, tenant: &Tenant, route: InstanceRoute) -> RealmResult<InstanceRoute> {
        let route = route.prepare()?;
        self.ensure(tenant).await?;
        if let Some(existing) = self.catalog.find_by_key(tenant, &route.name).await? {
            if existing.id != route.id {
                return Err(RealmError::Conflict(format!(
                    "instance route [{}] already exists as [{}]",
                    route.name, existing.id
                )));
            }
        }
        self.catalog.upsert(tenant, route.clone()).await?;
        tracing::info!(tenant = %tenant, route_id = %route.id, name = %route.name, "Stored instanced route");
        self.store(tenant, route)
    }

    /// Every instanced route of a tenant, ordered by id.
    ///
    /// # Errors
    ///
    /// Load errors.
    pub async fn routes(&self, tenant: &Tenant) -> RealmResult<Vec<InstanceRoute>> {
        self.ensure(tenant).await?;
        Ok(self.routes.snapshot(tenant))
    }

    /// One instanced route.
    ///
    /// # Errors
    ///
    /// Not-found if the tenant has no such route; load errors.
    pub async fn route(&self, tenant: &Tenant, id: Uuid) -> RealmResult<InstanceRoute> {
        self.ensure(tenant).await?;
        self.routes.get(tenant, &id)
    }

    async fn resolve(&self, tenant: &Tenant, body: &StartBody) -> RealmResult<InstanceRoute> {
        if !body.route_id.is_nil() {
            return self.route(tenant, body.route_id).await;
        }
        self.routes(tenant)
            .await?
            .into_iter()
            .find(|r| r.name == body.route_name)
            .ok_or_else(|| RealmError::not_found("instance route", &body.route_name))
    }

    fn transit_route(&self, tenant: &Tenant, map_id: u32) -> Option<InstanceRoute> {
        self.routes
            .by_container(tenant, &ContainerKey::Map(map_id))
            .into_iter()
            .next()
    }

    // -----------------------------------------------------------------------
    // Voyages
    // -----------------------------------------------------------------------

    /// Every voyage of a tenant, ordered by id.
    #[must_use]
    pub fn all_voyages(&self, tenant: &Tenant) -> Vec<Voyage> {
        self.voyages.snapshot(tenant)
    }

    /// The voyage carrying a character.
    ///
    /// # Errors
    ///
    /// Not-found when the character is not aboard anything.
    pub fn voyage_of(&self, tenant: &Tenant, character_id: u32) -> RealmResult<Voyage> {
        self.voyages.by_participant(tenant, character_id)
    }

    /// Board a character onto a voyage of a route: one still boarding with
    /// room, or a new one. The character is warped into the
    /// voyage's instance of the first transit map.
    ///
    /// # Errors
    ///
    /// Not-found for an unknown route, conflict when the character is
    /// already aboard a voyage; load and bus errors.
    pub async fn start(&self, tenant: &Tenant, passenger: Passenger, body: &StartBody) -> RealmResult<Voyage> {
        let route = self.resolve(tenant, body).await?;
        let Some(&first_map) = route.transit_map_ids.first() else {
            return Err(RealmError::validation(format!("route [{}] has no transit map", route.name)));
        };
        if let Ok(current) = self.voyages.by_participant(tenant, passenger.character_id) {
            return Err(RealmError::Conflict(format!(
                "character [{}] already aboard voyage [{}]",
                passenger.character_id,
                current.id()
            )));
        }
        let now = self.now();
        let voyage = self
            .emitter
            .emit(tenant, |buffer| {
                let voyage = self.board(tenant, &route, passenger, now)?;
                let warp = CharacterCommand::change_map_in(
                    passenger.world_id,
                    passenger.channel_id,
                    passenger.character_id,
                    first_map,
                    voyage.id(),
                );
                buffer.put(&self.topics.character, passenger.character_id, &warp)?;
                self.put_event(
                    buffer,
                    &voyage,
                    passenger,
                    InstanceChange::Started {
                        channel_id: passenger.channel_id,
                    },
                )?;
                Ok(voyage)
            })
            .await?;
        tracing::info!(
            tenant = %tenant,
            character_id = passenger.character_id,
            route_id = %route.id,
            voyage_id = %voyage.id(),
            aboard = voyage.passengers().len(),
            "Passenger boarded"
        );
        Ok(voyage)
    }

    fn board(&self, tenant: &Tenant, route: &InstanceRoute, passenger: Passenger, now: DateTime<Utc>) -> RealmResult<Voyage> {
        for candidate in self.voyages.by_container(tenant, &ContainerKey::Route(route.id)) {
            if !candidate.accepts(route.capacity, now) {
                continue;
            }
            match self.voyages.update(tenant, &candidate.id(), |current| {
                current.with_passenger(route.capacity, passenger, now)
            }) {
                Ok(voyage) => return Ok(voyage),
                Err(e) if e.is_not_found() || matches!(e, RealmError::Conflict(_)) => {},
                Err(e) => return Err(e),
            }
        }
        self.voyages.insert(tenant, Voyage::open(route, passenger, now))
    }

    /// A character entered `map_id`. Aboard a voyage, a transit map of its
    /// route publishes `TRANSIT_ENTERED`; any other map takes the character
    /// off the voyage.
    ///
    /// # Errors
    ///
    /// Load and bus errors.
    pub async fn on_map_entered(&self, tenant: &Tenant, character_id: u32, channel_id: u8, map_id: u32) -> RealmResult<()> {
        let Ok(voyage) = self.voyages.by_participant(tenant, character_id) else {
            return Ok(());
        };
        self.ensure(tenant).await?;
        let Some(route) = self.routes.find(tenant, &voyage.route_id()) else {
            tracing::warn!(tenant = %tenant, voyage_id = %voyage.id(), route_id = %voyage.route_id(), "Voyage of an unknown route");
            return Ok(());
        };
        if !route.has_transit_map(map_id) {
            self.cancel(tenant, character_id, REASON_MAP_EXIT).await?;
            return Ok(());
        }
        let Some(passenger) = voyage.passengers().iter().find(|p| p.character_id == character_id).copied() else {
            return Ok(());
        };
        let change = InstanceChange::TransitEntered {
            channel_id,
            map_id,
            remaining_secs: voyage.remaining_secs(self.now()),
            message: route.transit_message.clone(),
        };
        self.emitter
            .emit(tenant, |buffer| self.put_event(buffer, &voyage, passenger, change))
            .await
    }

    /// A character logged out. It is taken off its voyage, if any.
    ///
    /// # Errors
    ///
    /// Bus errors.
    pub async fn on_logout(&self, tenant: &Tenant, character_id: u32) -> RealmResult<Option<Voyage>> {
        self.cancel(tenant, character_id, REASON_LOGOUT).await
    }

    /// A character logged in on `map_id`. Voyages do not survive a logout,
    /// so landing on a transit map sends the character to the route's start
    /// map. Returns the route that claimed the map.
    ///
    /// # Errors
    ///
    /// Load and bus errors.
    pub async fn on_login(
        &self,
        tenant: &Tenant,
        character_id: u32,
        world_id: u8,
        channel_id: u8,
        map_id: u32,
    ) -> RealmResult<Option<InstanceRoute>> {
        self.ensure(tenant).await?;
        let Some(route) = self.transit_route(tenant, map_id) else {
            return Ok(None);
        };
        let warp = CharacterCommand::change_map(world_id, channel_id, character_id, route.start_map_id);
        self.emitter
            .emit(tenant, |buffer| Ok(buffer.put(&self.topics.character, character_id, &warp)?))
            .await?;
        tracing::info!(
            tenant = %tenant,
            character_id,
            route_id = %route.id,
            from = map_id,
            to = route.start_map_id,
            "Returned stranded passenger to the start map"
        );
        Ok(Some(route))
    }

    /// Take a character off its voyage and publish `CANCELLED`. The last
    /// passenger out releases the voyage. Returns the voyage as left.
    async fn cancel(&self, tenant: &Tenant, character_id: u32, reason: &str) -> RealmResult<Option<Voyage>> {
        let Ok(voyage) = self.voyages.by_participant(tenant, character_id) else {
            return Ok(None);
        };
        let left = self
            .emitter
            .emit(tenant, |buffer| {
                let (left, passenger) = match self
                    .voyages
                    .update_with(tenant, &voyage.id(), |current| current.without(character_id))
                {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_not_found() => return Ok(None),
                    Err(e) => return Err(e),
                };
                let change = InstanceChange::Cancelled {
                    channel_id: passenger.channel_id,
                    reason: reason.to_string(),
                };
                self.put_event(buffer, &left, passenger, change)?;
                if left.state() == VoyageState::Released {
                    self.voyages.delete(tenant, &left.id());
                }
                Ok(Some(left))
            })
            .await?;
        if let Some(voyage) = &left {
            tracing::info!(
                tenant = %tenant,
                character_id,
                voyage_id = %voyage.id(),
                reason = %reason,
                released = voyage.state() == VoyageState::Released,
                "Passenger left voyage"
            );
        }
        Ok(left)
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Close boarding, deliver arrived voyages and return stuck ones to the
    /// start map. Returns how many voyages moved on.
    pub async fn tick(&self, tenant: &Tenant, now: DateTime<Utc>) -> usize {
        let mut moved = 0;
        for voyage in self.voyages.snapshot(tenant) {
            let Some(route) = self.routes.find(tenant, &voyage.route_id()) else {
                tracing::warn!(tenant = %tenant, voyage_id = %voyage.id(), "Voyage of an unknown route");
                continue;
            };
            let result = match voyage.due(route.max_lifetime(), now) {
                Due::Nothing => continue,
                Due::Departure => self.depart(tenant, &voyage),
                Due::Arrival => self.disembark(tenant, voyage.id(), &route, Due::Arrival).await,
                Due::Stuck => self.disembark(tenant, voyage.id(), &route, Due::Stuck).await,
            };
            match result {
                Ok(true) => moved += 1,
                Ok(false) => {},
                Err(e) => {
                    tracing::error!(tenant = %tenant, voyage_id = %voyage.id(), error = %e, "Voyage update failed");
                },
            }
        }
        moved
    }

    fn depart(&self, tenant: &Tenant, voyage: &Voyage) -> RealmResult<bool> {
        let (departed, moved) = match self.voyages.update_with(tenant, &voyage.id(), |current| {
            if current.state() == VoyageState::Boarding {
                Ok((current.departed(), true))
            } else {
                Ok((current.clone(), false))
            }
        }) {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        if moved {
            tracing::debug!(
                tenant = %tenant,
                voyage_id = %departed.id(),
                passengers = departed.passengers().len(),
                "Voyage departed"
            );
        }
        Ok(moved)
    }

    /// Remove a voyage and warp everyone aboard: to the destination on
    /// arrival, back to the start map when stuck. Whoever removes the voyage
    /// publishes, so a racing tick or cancellation never doubles up.
    async fn disembark(&self, tenant: &Tenant, voyage_id: Uuid, route: &InstanceRoute, due: Due) -> RealmResult<bool> {
        let Some(voyage) = self.voyages.delete(tenant, &voyage_id) else {
            return Ok(false);
        };
        let map_id = if due == Due::Arrival {
            route.destination_map_id
        } else {
            route.start_map_id
        };
        self.emitter
            .emit(tenant, |buffer| {
                for &passenger in voyage.passengers() {
                    let warp = CharacterCommand::change_map(
                        passenger.world_id,
                        passenger.channel_id,
                        passenger.character_id,
                        map_id,
                    );
                    buffer.put(&self.topics.character, passenger.character_id, &warp)?;
                    let change = if due == Due::Arrival {
                        InstanceChange::Completed {
                            channel_id: passenger.channel_id,
                            map_id,
                        }
                    } else {
                        InstanceChange::Cancelled {
                            channel_id: passenger.channel_id,
                            reason: REASON_STUCK.to_string(),
                        }
                    };
                    self.put_event(buffer, &voyage, passenger, change)?;
                }
                Ok(())
            })
            .await?;
        if due == Due::Arrival {
            tracing::info!(tenant = %tenant, voyage_id = %voyage_id, passengers = voyage.passengers().len(), "Voyage arrived");
        } else {
            tracing::warn!(tenant = %tenant, voyage_id = %voyage_id, passengers = voyage.passengers().len(), "Stuck voyage returned");
        }
        Ok(true)
    }

    /// Return everyone aboard any voyage to their route's start map and drop
    /// every voyage. Returns how many characters were warped.
    pub async fn shutdown(&self) -> usize {
        let mut warped = 0;
        for tenant in self.voyages.tenants() {
            for voyage in self.voyages.snapshot(&tenant) {
                let Some(voyage) = self.voyages.delete(&tenant, &voyage.id()) else {
                    continue;
                };
                let Some(route) = self.routes.find(&tenant, &voyage.route_id()) else {
                    tracing::warn!(tenant = %tenant, voyage_id = %voyage.id(), "Voyage of an unknown route dropped");
                    continue;
                };
                let result = self
                    .emitter
                    .emit(&tenant, |buffer| {
                        for p in voyage.passengers() {
                            let warp = CharacterCommand::change_map(p.world_id, p.channel_id, p.character_id, route.start_map_id);
                            buffer.put(&self.topics.character, p.character_id, &warp)?;
                        }
                        Ok(voyage.passengers().len())
                    })
                    .await;
                match result {
                    Ok(count) => warped += count,
                    Err(e) => {
                        tracing::error!(tenant = %tenant, voyage_id = %voyage.id(), error = %e, "Passengers not returned at shutdown");
                    },
                }
            }
        }
        tracing::info!(warped, "Voyages closed");
        warped
    }

    fn put_event(
        &self,
        buffer: &mut MessageBuffer,
        voyage: &Voyage,
        passenger: Passenger,
        change: InstanceChange,
    ) -> RealmResult<()> {
        let event = InstanceTransportEvent {
            world_id: passenger.world_id,
            character_id: passenger.character_id,
            route_id: voyage.route_id(),
            instance_id: voyage.id(),
            change,
        };
        buffer.put(&self.topics.instance, passenger.character_id, &event)?;
        Ok(())
    }
}

impl std::fmt::Debug for InstanceTransportProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceTransportProcessor")
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}
