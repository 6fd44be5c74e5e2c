//! Relationship-aware conversion of entities into JSON objects.
//!
//! Restaurant, Pizza and RestaurantPizza reference each other. Serialization
//! follows loaded relationships, but an edge listed in
//! [`EXCLUDED_BACK_REFERENCES`] drops the reverse link on the child, and no
//! child ever serializes a relationship pointing back at the origin kind.

use serde_json::{Map, Value};

use crate::types::{Pizza, Restaurant, RestaurantPizza};

/// Maximum number of relationship hops followed from the origin entity.
pub const MAX_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Restaurant,
    Pizza,
    RestaurantPizza,
}

/// Whether loaded relationships are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Include {
    Columns,
    Relationships,
}

/// `child.excluded` is omitted whenever the child is reached via `source.field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcludedBackReference {
    pub source: EntityKind,
    pub field: &'static str,
    pub excluded: &'static str,
}

pub const EXCLUDED_BACK_REFERENCES: &[ExcludedBackReference] = &[
    ExcludedBackReference {
        source: EntityKind::Restaurant,
        field: "restaurant_pizzas",
        excluded: "restaurant",
    },
    ExcludedBackReference {
        source: EntityKind::Pizza,
        field: "restaurant_pizzas",
        excluded: "pizza",
    },
    ExcludedBackReference {
        source: EntityKind::RestaurantPizza,
        field: "restaurant",
        excluded: "restaurant_pizzas",
    },
    ExcludedBackReference {
        source: EntityKind::RestaurantPizza,
        field: "pizza",
        excluded: "restaurant_pizzas",
    },
];

fn excluded_for(source: EntityKind, field: &str) -> Option<&'static str> {
    EXCLUDED_BACK_REFERENCES
        .iter()
        .find(|rule| rule.source == source && rule.field == field)
        .map(|rule| rule.excluded)
}

/// A loaded relationship of an entity.
pub struct Relation<'a> {
    pub field: &'static str,
    pub target: EntityKind,
    pub related: Related<'a>,
}

pub enum Related<'a> {
    One(&'a dyn Entity),
    Many(Vec<&'a dyn Entity>),
}

/// Implemented by every persisted record type.
pub trait Entity {
    fn kind(&self) -> EntityKind;

    /// Own column values, without relationships.
    fn columns(&self) -> Map<String, Value>;

    /// Relationships that were loaded alongside the entity.
    fn relations(&self) -> Vec<Relation<'_>>;
}

/// Converts `entity` into a JSON object.
pub fn to_payload(entity: &dyn Entity, include: Include) -> Map<String, Value> {
    match include {
        Include::Columns => entity.columns(),
        Include::Relationships => serialize_node(entity, entity.kind(), None, 0),
    }
}

/// Serializes each entity of a list with the same inclusion mode.
pub fn to_payload_list<'a, I, E>(entities: I, include: Include) -> Vec<Value>
where
    I: IntoIterator<Item = &'a E>,
    E: Entity + 'a,
{
    entities
        .into_iter()
        .map(|entity| Value::Object(to_payload(entity, include)))
        .collect()
}

fn serialize_node(
    entity: &dyn Entity,
    origin: EntityKind,
    excluded: Option<&str>,
    depth: usize,
) -> Map<String, Value> {
    let mut payload = entity.columns();
    if depth >= MAX_DEPTH {
        return payload;
    }

    for relation in entity.relations() {
        if excluded == Some(relation.field) {
            continue;
        }
        if depth > 0 && relation.target == origin {
            continue;
        }

        let child_excluded = excluded_for(entity.kind(), relation.field);
        let value = match relation.related {
            Related::One(child) => {
                Value::Object(serialize_node(child, origin, child_excluded, depth + 1))
            }
            Related::Many(children) => Value::Array(
                children
                    .into_iter()
                    .map(|child| {
                        Value::Object(serialize_node(child, origin, child_excluded, depth + 1))
                    })
                    .collect(),
            ),
        };
        payload.insert(relation.field.to_string(), value);
    }

    payload
}

fn column_map<const N: usize>(columns: [(&str, Value); N]) -> Map<String, Value> {
    columns
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}

fn many<T: Entity>(entries: &[T]) -> Related<'_> {
    Related::Many(entries.iter().map(|entry| entry as &dyn Entity).collect())
}

impl Entity for Restaurant {
    fn kind(&self) -> EntityKind {
        EntityKind::Restaurant
    }

    fn columns(&self) -> Map<String, Value> {
        column_map([
            ("id", Value::from(self.id)),
            ("name", Value::from(self.name.as_str())),
            ("address", Value::from(self.address.as_str())),
        ])
    }

    fn relations(&self) -> Vec<Relation<'_>> {
        self.restaurant_pizzas
            .as_deref()
            .map(|entries| Relation {
                field: "restaurant_pizzas",
                target: EntityKind::RestaurantPizza,
                related: many(entries),
            })
            .into_iter()
            .collect()
    }
}

impl Entity for Pizza {
    fn kind(&self) -> EntityKind {
        EntityKind::Pizza
    }

    fn columns(&self) -> Map<String, Value> {
        column_map([
            ("id", Value::from(self.id)),
            ("name", Value::from(self.name.as_str())),
            ("ingredients", Value::from(self.ingredients.as_str())),
        ])
    }

    fn relations(&self) -> Vec<Relation<'_>> {
        self.restaurant_pizzas
            .as_deref()
            .map(|entries| Relation {
                field: "restaurant_pizzas",
                target: EntityKind::RestaurantPizza,
                related: many(entries),
            })
            .into_iter()
            .collect()
    }
}

impl Entity for RestaurantPizza {
    fn kind(&self) -> EntityKind {
        EntityKind::RestaurantPizza
    }

    fn columns(&self) -> Map<String, Value> {
        column_map([
            ("id", Value::from(self.id)),
            ("price", Value::from(self.price)),
            ("restaurant_id", Value::from(self.restaurant_id)),
            ("pizza_id", Value::from(self.pizza_id)),
        ])
    }

    fn relations(&self) -> Vec<Relation<'_>> {
        let mut relations = Vec::with_capacity(2);
        if let Some(restaurant) = self.restaurant.as_deref() {
            relations.push(Relation {
                field: "restaurant",
                target: EntityKind::Restaurant,
                related: Related::One(restaurant),
            });
        }
        if let Some(pizza) = self.pizza.as_deref() {
            relations.push(Relation {
                field: "pizza",
                target: EntityKind::Pizza,
                related: Related::One(pizza),
            });
        }
        relations
    }
}
