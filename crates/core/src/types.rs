/// A restaurant row.
///
/// `restaurant_pizzas` is `None` when the relationship was not loaded by the
/// query that produced the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub restaurant_pizzas: Option<Vec<RestaurantPizza>>,
}

impl Restaurant {
    /// Creates a restaurant without any loaded relationships.
    pub fn new(id: i64, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            restaurant_pizzas: None,
        }
    }

    pub fn with_restaurant_pizzas(mut self, entries: Vec<RestaurantPizza>) -> Self {
        self.restaurant_pizzas = Some(entries);
        self
    }
}

/// A pizza row. Pizzas are referenced by [`RestaurantPizza`] but never owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pizza {
    pub id: i64,
    pub name: String,
    pub ingredients: String,
    pub restaurant_pizzas: Option<Vec<RestaurantPizza>>,
}

impl Pizza {
    /// Creates a pizza without any loaded relationships.
    pub fn new(id: i64, name: impl Into<String>, ingredients: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ingredients: ingredients.into(),
            restaurant_pizzas: None,
        }
    }
}

/// Association row: a restaurant offers a pizza at a price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestaurantPizza {
    pub id: i64,
    pub price: i64,
    pub restaurant_id: i64,
    pub pizza_id: i64,
    pub restaurant: Option<Box<Restaurant>>,
    pub pizza: Option<Box<Pizza>>,
}

impl RestaurantPizza {
    /// Creates an association row without loaded parents.
    pub fn new(id: i64, price: i64, restaurant_id: i64, pizza_id: i64) -> Self {
        Self {
            id,
            price,
            restaurant_id,
            pizza_id,
            restaurant: None,
            pizza: None,
        }
    }

    pub fn with_restaurant(mut self, restaurant: Restaurant) -> Self {
        self.restaurant = Some(Box::new(restaurant));
        self
    }

    pub fn with_pizza(mut self, pizza: Pizza) -> Self {
        self.pizza = Some(Box::new(pizza));
        self
    }
}
