use std::{str::FromStr, time::Duration};

use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use thiserror::Error;

pub use sqlx::Error as SqlxError;

use pizzeria_core::{
    NewPizza, NewRestaurant, NewRestaurantPizza, Pizza, Restaurant, RestaurantPizza,
};

/// SQLite extended result code for a violated foreign key.
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
/// SQLite extended result code for a violated `CHECK` constraint.
const SQLITE_CONSTRAINT_CHECK: &str = "275";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// Foreign keys are enforced on every pooled connection, which the
    /// cascading restaurant delete relies on.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for the `restaurants` table.
    pub fn restaurants(&self) -> RestaurantRepository {
        RestaurantRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the `pizzas` table.
    pub fn pizzas(&self) -> PizzaRepository {
        PizzaRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the `restaurant_pizzas` association table.
    pub fn restaurant_pizzas(&self) -> RestaurantPizzaRepository {
        RestaurantPizzaRepository {
            pool: self.pool.clone(),
        }
    }

    /// Writes a whole catalog in one transaction, unless restaurants already exist.
    ///
    /// Returns `None` when the catalog was left untouched. Any failure rolls
    /// back every row written so far.
    pub async fn seed_catalog(
        &self,
        seed: &CatalogSeed<'_>,
    ) -> Result<Option<SeededRows>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM restaurants")
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            return Ok(None);
        }

        let mut restaurant_ids = Vec::with_capacity(seed.restaurants.len());
        for record in seed.restaurants {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO restaurants (name, address) VALUES (?, ?) RETURNING id",
            )
            .bind(&record.name)
            .bind(&record.address)
            .fetch_one(&mut *tx)
            .await?;
            restaurant_ids.push(id);
        }

        let mut pizza_ids = Vec::with_capacity(seed.pizzas.len());
        for record in seed.pizzas {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO pizzas (name, ingredients) VALUES (?, ?) RETURNING id",
            )
            .bind(&record.name)
            .bind(&record.ingredients)
            .fetch_one(&mut *tx)
            .await?;
            pizza_ids.push(id);
        }

        for &(restaurant, pizza, price) in seed.menu {
            let restaurant_id = *restaurant_ids
                .get(restaurant)
                .ok_or(StorageError::SeedIndex(restaurant))?;
            let pizza_id = *pizza_ids.get(pizza).ok_or(StorageError::SeedIndex(pizza))?;
            sqlx::query(
                "INSERT INTO restaurant_pizzas (price, restaurant_id, pizza_id) VALUES (?, ?, ?)",
            )
            .bind(price)
            .bind(restaurant_id)
            .bind(pizza_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Some(SeededRows {
            restaurants: restaurant_ids.len(),
            pizzas: pizza_ids.len(),
            restaurant_pizzas: seed.menu.len(),
        }))
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Rows handed to [`Database::seed_catalog`].
#[derive(Debug, Clone, Copy)]
pub struct CatalogSeed<'a> {
    pub restaurants: &'a [NewRestaurant],
    pub pizzas: &'a [NewPizza],
    /// `(restaurant index, pizza index, price)` into the slices above.
    pub menu: &'a [(usize, usize, i64)],
}

/// Row counts written by a successful seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededRows {
    pub restaurants: usize,
    pub pizzas: usize,
    pub restaurant_pizzas: usize,
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("seed menu points at missing row {0}")]
    SeedIndex(usize),
}

#[derive(Debug, sqlx::FromRow)]
struct RestaurantRow {
    id: i64,
    name: String,
    address: String,
}

impl RestaurantRow {
    fn into_domain(self) -> Restaurant {
        Restaurant::new(self.id, self.name, self.address)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PizzaRow {
    id: i64,
    name: String,
    ingredients: String,
}

impl PizzaRow {
    fn into_domain(self) -> Pizza {
        Pizza::new(self.id, self.name, self.ingredients)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RestaurantPizzaRow {
    id: i64,
    price: i64,
    restaurant_id: i64,
    pizza_id: i64,
}

impl RestaurantPizzaRow {
    fn into_domain(self) -> RestaurantPizza {
        RestaurantPizza::new(self.id, self.price, self.restaurant_id, self.pizza_id)
    }
}

/// Association row joined with the pizza it points at.
#[derive(Debug, sqlx::FromRow)]
struct RestaurantPizzaWithPizzaRow {
    id: i64,
    price: i64,
    restaurant_id: i64,
    pizza_id: i64,
    pizza_name: String,
    pizza_ingredients: String,
}

impl RestaurantPizzaWithPizzaRow {
    fn into_domain(self) -> RestaurantPizza {
        let pizza = Pizza::new(self.pizza_id, self.pizza_name, self.pizza_ingredients);
        RestaurantPizza::new(self.id, self.price, self.restaurant_id, self.pizza_id)
            .with_pizza(pizza)
    }
}

/// Repository for the `restaurants` table.
#[derive(Clone)]
pub struct RestaurantRepository {
    pool: SqlitePool,
}

impl RestaurantRepository {
    /// Lists all restaurants ordered by id, without relationships.
    pub async fn list(&self) -> Result<Vec<Restaurant>, RestaurantError> {
        let rows = sqlx::query_as::<_, RestaurantRow>(
            "SELECT id, name, address FROM restaurants ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RestaurantRow::into_domain).collect())
    }

    /// Loads a restaurant together with its restaurant pizzas and their pizzas.
    pub async fn fetch_with_pizzas(&self, id: i64) -> Result<Restaurant, RestaurantError> {
        let restaurant = sqlx::query_as::<_, RestaurantRow>(
            "SELECT id, name, address FROM restaurants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RestaurantError::NotFound)?;

        let entries = sqlx::query_as::<_, RestaurantPizzaWithPizzaRow>(
            r#"
SELECT rp.id,
       rp.price,
       rp.restaurant_id,
       rp.pizza_id,
       p.name AS pizza_name,
       p.ingredients AS pizza_ingredients
  FROM restaurant_pizzas AS rp
  JOIN pizzas AS p
    ON p.id = rp.pizza_id
 WHERE rp.restaurant_id = ?
 ORDER BY rp.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(restaurant.into_domain().with_restaurant_pizzas(
            entries
                .into_iter()
                .map(RestaurantPizzaWithPizzaRow::into_domain)
                .collect(),
        ))
    }

    /// Deletes a restaurant; its restaurant pizzas are removed by the cascade.
    pub async fn delete(&self, id: i64) -> Result<(), RestaurantError> {
        let result = sqlx::query("DELETE FROM restaurants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RestaurantError::NotFound);
        }
        Ok(())
    }

    /// Inserts a new restaurant and returns the stored row.
    pub async fn insert(&self, record: &NewRestaurant) -> Result<Restaurant, RestaurantError> {
        let row = sqlx::query_as::<_, RestaurantRow>(
            "INSERT INTO restaurants (name, address) VALUES (?, ?) \
             RETURNING id, name, address",
        )
        .bind(&record.name)
        .bind(&record.address)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_domain())
    }

    /// Counts stored restaurants.
    pub async fn count(&self) -> Result<u64, RestaurantError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM restaurants")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

/// Errors that can occur while reading or mutating restaurants.
#[derive(Debug, Error)]
pub enum RestaurantError {
    #[error("restaurant not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for the `pizzas` table.
#[derive(Clone)]
pub struct PizzaRepository {
    pool: SqlitePool,
}

impl PizzaRepository {
    /// Lists all pizzas ordered by id, without relationships.
    pub async fn list(&self) -> Result<Vec<Pizza>, PizzaError> {
        let rows =
            sqlx::query_as::<_, PizzaRow>("SELECT id, name, ingredients FROM pizzas ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(PizzaRow::into_domain).collect())
    }

    /// Inserts a new pizza and returns the stored row.
    pub async fn insert(&self, record: &NewPizza) -> Result<Pizza, PizzaError> {
        let row = sqlx::query_as::<_, PizzaRow>(
            "INSERT INTO pizzas (name, ingredients) VALUES (?, ?) \
             RETURNING id, name, ingredients",
        )
        .bind(&record.name)
        .bind(&record.ingredients)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_domain())
    }
}

/// Errors that can occur while reading or mutating pizzas.
#[derive(Debug, Error)]
pub enum PizzaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for the `restaurant_pizzas` association table.
#[derive(Clone)]
pub struct RestaurantPizzaRepository {
    pool: SqlitePool,
}

impl RestaurantPizzaRepository {
    /// Inserts a restaurant pizza and returns it with both parents loaded.
    ///
    /// The insert and the parent lookups share one transaction, so a failed
    /// insert leaves no row behind.
    pub async fn insert(
        &self,
        record: &NewRestaurantPizza,
    ) -> Result<RestaurantPizza, RestaurantPizzaError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RestaurantPizzaRow>(
            "INSERT INTO restaurant_pizzas (price, restaurant_id, pizza_id) VALUES (?, ?, ?) \
             RETURNING id, price, restaurant_id, pizza_id",
        )
        .bind(record.price)
        .bind(record.restaurant_id)
        .bind(record.pizza_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|code| code.into_owned());
                match code.as_deref() {
                    Some(SQLITE_CONSTRAINT_FOREIGNKEY) => RestaurantPizzaError::MissingReference,
                    Some(SQLITE_CONSTRAINT_CHECK) => {
                        RestaurantPizzaError::PriceOutOfRange(record.price)
                    }
                    _ => RestaurantPizzaError::Database(sqlx::Error::Database(db_err)),
                }
            }
            other => RestaurantPizzaError::Database(other),
        })?;

        let restaurant = sqlx::query_as::<_, RestaurantRow>(
            "SELECT id, name, address FROM restaurants WHERE id = ?",
        )
        .bind(row.restaurant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RestaurantPizzaError::MissingReference)?;

        let pizza =
            sqlx::query_as::<_, PizzaRow>("SELECT id, name, ingredients FROM pizzas WHERE id = ?")
                .bind(row.pizza_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RestaurantPizzaError::MissingReference)?;

        tx.commit().await?;

        Ok(row
            .into_domain()
            .with_restaurant(restaurant.into_domain())
            .with_pizza(pizza.into_domain()))
    }

    /// Counts stored restaurant pizzas.
    pub async fn count(&self) -> Result<u64, RestaurantPizzaError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM restaurant_pizzas")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

/// Errors that can occur while creating restaurant pizzas.
#[derive(Debug, Error)]
pub enum RestaurantPizzaError {
    #[error("referenced restaurant or pizza does not exist")]
    MissingReference,
    #[error("price {0} violates the price constraint")]
    PriceOutOfRange(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");
        (db, dir)
    }

    async fn seed_pair(db: &Database) -> (Restaurant, Pizza) {
        let restaurant = db
            .restaurants()
            .insert(&NewRestaurant::new("Karen's Pizza Shack", "address1").unwrap())
            .await
            .expect("insert restaurant");
        let pizza = db
            .pizzas()
            .insert(&NewPizza::new("Emma", "Dough, Tomato Sauce, Cheese").unwrap())
            .await
            .expect("insert pizza");
        (restaurant, pizza)
    }

    #[tokio::test]
    async fn migrations_apply() {
        let (db, _dir) = setup_db().await;

        let tables: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('restaurants', 'pizzas', 'restaurant_pizzas')",
        )
        .fetch_one(db.pool())
        .await
        .expect("fetch tables");
        assert_eq!(tables.0, 3, "expected catalog tables to be created");
    }

    #[tokio::test]
    async fn lists_restaurants_without_relationships() {
        let (db, _dir) = setup_db().await;
        let (restaurant, pizza) = seed_pair(&db).await;
        db.restaurant_pizzas()
            .insert(&NewRestaurantPizza::new(10, restaurant.id, pizza.id).unwrap())
            .await
            .expect("insert restaurant pizza");

        let listed = db.restaurants().list().await.expect("list");
        assert_eq!(listed, vec![restaurant]);
        assert!(listed[0].restaurant_pizzas.is_none());
    }

    #[tokio::test]
    async fn fetch_with_pizzas_loads_nested_pizza() {
        let (db, _dir) = setup_db().await;
        let (restaurant, pizza) = seed_pair(&db).await;
        let created = db
            .restaurant_pizzas()
            .insert(&NewRestaurantPizza::new(12, restaurant.id, pizza.id).unwrap())
            .await
            .expect("insert restaurant pizza");

        let loaded = db
            .restaurants()
            .fetch_with_pizzas(restaurant.id)
            .await
            .expect("fetch");
        let entries = loaded.restaurant_pizzas.expect("relationship loaded");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, created.id);
        assert_eq!(entries[0].price, 12);
        assert_eq!(entries[0].pizza.as_deref(), Some(&pizza));
        assert!(entries[0].restaurant.is_none());
    }

    #[tokio::test]
    async fn fetch_with_pizzas_errors_for_missing_restaurant() {
        let (db, _dir) = setup_db().await;
        let err = db.restaurants().fetch_with_pizzas(404).await.unwrap_err();
        assert!(matches!(err, RestaurantError::NotFound));
    }

    #[tokio::test]
    async fn delete_cascades_to_restaurant_pizzas() {
        let (db, _dir) = setup_db().await;
        let (restaurant, pizza) = seed_pair(&db).await;
        let repo = db.restaurant_pizzas();
        repo.insert(&NewRestaurantPizza::new(5, restaurant.id, pizza.id).unwrap())
            .await
            .expect("first insert");
        repo.insert(&NewRestaurantPizza::new(7, restaurant.id, pizza.id).unwrap())
            .await
            .expect("second insert");
        assert_eq!(repo.count().await.expect("count"), 2);

        db.restaurants()
            .delete(restaurant.id)
            .await
            .expect("delete succeeds");

        assert_eq!(repo.count().await.expect("count"), 0);
        assert_eq!(db.restaurants().count().await.expect("count"), 0);
        assert_eq!(db.pizzas().list().await.expect("pizzas").len(), 1);
    }

    #[tokio::test]
    async fn delete_errors_for_missing_restaurant() {
        let (db, _dir) = setup_db().await;
        let err = db.restaurants().delete(99).await.unwrap_err();
        assert!(matches!(err, RestaurantError::NotFound));
    }

    #[tokio::test]
    async fn insert_returns_row_with_both_parents() {
        let (db, _dir) = setup_db().await;
        let (restaurant, pizza) = seed_pair(&db).await;

        let created = db
            .restaurant_pizzas()
            .insert(&NewRestaurantPizza::new(15, restaurant.id, pizza.id).unwrap())
            .await
            .expect("insert");
        assert_eq!(created.price, 15);
        assert_eq!(created.restaurant.as_deref(), Some(&restaurant));
        assert_eq!(created.pizza.as_deref(), Some(&pizza));
    }

    #[tokio::test]
    async fn insert_rejects_unknown_references() {
        let (db, _dir) = setup_db().await;
        let (restaurant, pizza) = seed_pair(&db).await;
        let repo = db.restaurant_pizzas();

        let err = repo
            .insert(&NewRestaurantPizza::new(10, restaurant.id, pizza.id + 100).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RestaurantPizzaError::MissingReference));

        let err = repo
            .insert(&NewRestaurantPizza::new(10, restaurant.id + 100, pizza.id).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RestaurantPizzaError::MissingReference));

        assert_eq!(repo.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn check_constraint_backs_the_price_rule() {
        let (db, _dir) = setup_db().await;
        let (restaurant, pizza) = seed_pair(&db).await;
        let unchecked = NewRestaurantPizza {
            price: 31,
            restaurant_id: restaurant.id,
            pizza_id: pizza.id,
        };

        let err = db.restaurant_pizzas().insert(&unchecked).await.unwrap_err();
        assert!(matches!(err, RestaurantPizzaError::PriceOutOfRange(31)));
    }

    fn demo_rows() -> (Vec<NewRestaurant>, Vec<NewPizza>) {
        (
            vec![
                NewRestaurant::new("Karen's Pizza Shack", "address1").unwrap(),
                NewRestaurant::new("Kiki's Pizza", "address3").unwrap(),
            ],
            vec![NewPizza::new("Emma", "Dough, Tomato Sauce, Cheese").unwrap()],
        )
    }

    #[tokio::test]
    async fn seed_catalog_writes_once() {
        let (db, _dir) = setup_db().await;
        let (restaurants, pizzas) = demo_rows();
        let seed = CatalogSeed {
            restaurants: &restaurants,
            pizzas: &pizzas,
            menu: &[(0, 0, 1), (1, 0, 9)],
        };

        let seeded = db.seed_catalog(&seed).await.expect("seed");
        assert_eq!(
            seeded,
            Some(SeededRows {
                restaurants: 2,
                pizzas: 1,
                restaurant_pizzas: 2,
            })
        );
        assert_eq!(db.restaurant_pizzas().count().await.expect("count"), 2);

        let again = db.seed_catalog(&seed).await.expect("second seed");
        assert_eq!(again, None);
        assert_eq!(db.restaurants().count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn failed_seed_leaves_catalog_empty() {
        let (db, _dir) = setup_db().await;
        let (restaurants, pizzas) = demo_rows();

        let out_of_range = CatalogSeed {
            restaurants: &restaurants,
            pizzas: &pizzas,
            menu: &[(0, 0, 1), (1, 0, 31)],
        };
        assert!(matches!(
            db.seed_catalog(&out_of_range).await,
            Err(StorageError::Database(_))
        ));

        let dangling = CatalogSeed {
            restaurants: &restaurants,
            pizzas: &pizzas,
            menu: &[(0, 0, 1), (0, 4, 9)],
        };
        assert!(matches!(
            db.seed_catalog(&dangling).await,
            Err(StorageError::SeedIndex(4))
        ));

        assert_eq!(db.restaurants().count().await.expect("count"), 0);
        assert_eq!(db.pizzas().list().await.expect("pizzas").len(), 0);
        assert_eq!(db.restaurant_pizzas().count().await.expect("count"), 0);

        let retry = CatalogSeed {
            menu: &[(0, 0, 1)],
            ..out_of_range
        };
        assert!(db.seed_catalog(&retry).await.expect("retry").is_some());
    }
}
