use metrics::counter;
use thiserror::Error;
use tracing::info;

use pizzeria_core::{validation::validate_price, NewPizza, NewRestaurant, ValidationError};
use pizzeria_storage::{CatalogSeed, Database, StorageError};

const RESTAURANTS: &[(&str, &str)] = &[
    ("Karen's Pizza Shack", "address1"),
    ("Sanjay's Pizza", "address2"),
    ("Kiki's Pizza", "address3"),
];

const PIZZAS: &[(&str, &str)] = &[
    ("Emma", "Dough, Tomato Sauce, Cheese"),
    ("Geri", "Dough, Tomato Sauce, Cheese, Pepperoni"),
    ("Melanie", "Dough, Sauce, Ricotta, Red peppers, Mustard"),
];

/// `(restaurant index, pizza index, price)` into the tables above.
const MENU: &[(usize, usize, i64)] = &[(0, 0, 1), (1, 1, 4), (2, 2, 5), (2, 0, 9)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The catalog already held restaurants.
    Skipped,
    Seeded {
        restaurants: usize,
        pizzas: usize,
        restaurant_pizzas: usize,
    },
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid demo record: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fills an empty catalog with the demo restaurants, pizzas and menu.
///
/// All rows land in one transaction, so a failed run leaves the catalog empty
/// and the next start seeds again.
pub async fn seed_demo_catalog(database: &Database) -> Result<SeedOutcome, SeedError> {
    let restaurants = RESTAURANTS
        .iter()
        .map(|(name, address)| NewRestaurant::new(*name, *address))
        .collect::<Result<Vec<_>, _>>()?;
    let pizzas = PIZZAS
        .iter()
        .map(|(name, ingredients)| NewPizza::new(*name, *ingredients))
        .collect::<Result<Vec<_>, _>>()?;
    for (_, _, price) in MENU {
        validate_price(*price)?;
    }

    let seed = CatalogSeed {
        restaurants: &restaurants,
        pizzas: &pizzas,
        menu: MENU,
    };
    let Some(rows) = database.seed_catalog(&seed).await? else {
        info!(stage = "seed", "catalog already populated, skipping demo data");
        return Ok(SeedOutcome::Skipped);
    };

    counter!("seed_rows_total", "table" => "restaurants").increment(rows.restaurants as u64);
    counter!("seed_rows_total", "table" => "pizzas").increment(rows.pizzas as u64);
    counter!("seed_rows_total", "table" => "restaurant_pizzas")
        .increment(rows.restaurant_pizzas as u64);

    let outcome = SeedOutcome::Seeded {
        restaurants: rows.restaurants,
        pizzas: rows.pizzas,
        restaurant_pizzas: rows.restaurant_pizzas,
    };
    info!(stage = "seed", ?outcome, "demo catalog seeded");
    Ok(outcome)
}
