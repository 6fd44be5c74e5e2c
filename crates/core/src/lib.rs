//! Domain layer for the pizza restaurant catalog.
//!
//! Entity types, request validation and the relationship-aware payload
//! serializer live here so that storage and HTTP layers share one model.

pub mod serialize;
pub mod types;
pub mod validation;

pub use serialize::{to_payload, EntityKind, Include};
pub use types::{Pizza, Restaurant, RestaurantPizza};
pub use validation::{NewPizza, NewRestaurant, NewRestaurantPizza, ValidationError};
