//! # Realm Peers
//!
//! HTTP implementations of the peer capabilities declared in
//! `realm_core::peer`. Every request carries the tenant headers, asks for
//! JSON:API, and is retried with backoff while the peer is unreachable.
//!
//! | Capability | Path (under `BASE_SERVICE_URL`) |
//! |---|---|
//! | character | `characters/{id}` |
//! | equipment / cash | `characters/{id}/inventory/compartments/{1\|5}/assets` |
//! | buffs | `characters/{id}/buffs` |
//! | skills | `characters/{id}/skills` |
//! | game data | `data/skills/{id}`, `data/cash/items/{id}`, `data/equipment/{id}`, `data/reactors/{id}` |
//! | quest progress | `characters/{id}/quests/{questId}` |
//! | field population | `worlds/{w}/channels/{c}/maps/{m}/characters` |
//! | parties | `parties/{id}`, `parties?filter[members.id]={id}` |
//!
//! A 404 on a collection is an empty list; a 404 on quest progress is
//! `NOT_STARTED`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod http;
pub mod jsonapi;

pub use client::{DEFAULT_BASE_URL, PeerClient};
pub use http::HttpPeers;
