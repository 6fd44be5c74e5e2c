use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Lowest accepted price for a restaurant pizza.
pub const MIN_PRICE: i64 = 1;
/// Highest accepted price for a restaurant pizza.
pub const MAX_PRICE: i64 = 30;

/// Reasons a write request is rejected before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` must be an integer")]
    InvalidType(&'static str),
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("price must be between 1 and 30 (got {0})")]
    PriceOutOfRange(i64),
}

impl ValidationError {
    /// Returns a stable label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::MissingField(_) => "missing_field",
            Self::InvalidType(_) => "invalid_type",
            Self::EmptyField(_) => "empty_field",
            Self::PriceOutOfRange(_) => "price_out_of_range",
        }
    }
}

/// Checks that `price` lies in the closed range `[MIN_PRICE, MAX_PRICE]`.
pub fn validate_price(price: i64) -> Result<i64, ValidationError> {
    if (MIN_PRICE..=MAX_PRICE).contains(&price) {
        Ok(price)
    } else {
        Err(ValidationError::PriceOutOfRange(price))
    }
}

/// Validated payload for creating a restaurant pizza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewRestaurantPizza {
    pub price: i64,
    pub restaurant_id: i64,
    pub pizza_id: i64,
}

impl NewRestaurantPizza {
    /// Builds a payload from already typed values, enforcing the price rule.
    pub fn new(price: i64, restaurant_id: i64, pizza_id: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            price: validate_price(price)?,
            restaurant_id,
            pizza_id,
        })
    }

    /// Parses a request body of the shape `{"price", "restaurant_id", "pizza_id"}`.
    ///
    /// Every field must be present and hold a JSON integer. Foreign key
    /// existence is left to the storage layer.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let object = body.as_object().ok_or(ValidationError::NotAnObject)?;
        let payload: RestaurantPizzaBody =
            serde_json::from_value(body.clone()).map_err(|_| {
                mistyped_field(object)
                    .map_or(ValidationError::NotAnObject, ValidationError::InvalidType)
            })?;

        let price = payload.price.ok_or(ValidationError::MissingField("price"))?;
        let restaurant_id = payload
            .restaurant_id
            .ok_or(ValidationError::MissingField("restaurant_id"))?;
        let pizza_id = payload
            .pizza_id
            .ok_or(ValidationError::MissingField("pizza_id"))?;
        Self::new(price, restaurant_id, pizza_id)
    }
}

#[derive(Debug, Deserialize)]
struct RestaurantPizzaBody {
    #[serde(default)]
    price: Option<i64>,
    #[serde(default)]
    restaurant_id: Option<i64>,
    #[serde(default)]
    pizza_id: Option<i64>,
}

const BODY_FIELDS: [&str; 3] = ["price", "restaurant_id", "pizza_id"];

/// First body field, in declaration order, that does not decode as an integer.
fn mistyped_field(object: &Map<String, Value>) -> Option<&'static str> {
    BODY_FIELDS.into_iter().find(|name| {
        object
            .get(*name)
            .is_some_and(|value| serde_json::from_value::<Option<i64>>(value.clone()).is_err())
    })
}

/// Validated payload for inserting a restaurant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRestaurant {
    pub name: String,
    pub address: String,
}

impl NewRestaurant {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            name: non_empty("name", name.into())?,
            address: non_empty("address", address.into())?,
        })
    }
}

/// Validated payload for inserting a pizza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPizza {
    pub name: String,
    pub ingredients: String,
}

impl NewPizza {
    pub fn new(
        name: impl Into<String>,
        ingredients: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            name: non_empty("name", name.into())?,
            ingredients: non_empty("ingredients", ingredients.into())?,
        })
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(value)
    }
}
