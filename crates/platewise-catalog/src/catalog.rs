//! [`Catalog`] – read-only, CSV-backed dish collection.
//!
//! # File format
//!
//! A header row followed by one dish per row.  Required columns:
//!
//! | column         | type    | notes                                  |
//! |----------------|---------|----------------------------------------|
//! | `id`           | text    | unique, non-empty                      |
//! | `name`         | text    |                                        |
//! | `cuisine`      | text    |                                        |
//! | `price`        | number  | finite, non-negative                   |
//! | `rating`       | number  | finite, 0–5                            |
//! | `dietary_tags` | text    | `;`-separated set, may be empty        |
//! | `description`  | text    |                                        |
//!
//! Optional columns: `restaurant`, `category`, `spice_level`,
//! `prep_time_mins`, `tags` (`;`-separated).  Column order is irrelevant.

use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use platewise_types::{Dish, PlateError};
use serde::Deserialize;
use tracing::info;

/// Columns every catalog file must provide.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "cuisine",
    "price",
    "rating",
    "dietary_tags",
    "description",
];

/// Raw CSV row before validation.
#[derive(Debug, Deserialize)]
struct DishRow {
    id: String,
    name: String,
    cuisine: String,
    price: f64,
    rating: f64,
    dietary_tags: String,
    description: String,
    #[serde(default)]
    restaurant: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    spice_level: String,
    #[serde(default)]
    prep_time_mins: Option<u32>,
    #[serde(default)]
    tags: String,
}

impl DishRow {
    fn into_dish(self, line: usize) -> Result<Dish, PlateError> {
        if self.id.is_empty() {
            return Err(PlateError::DataLoad(format!("line {line}: empty dish id")));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(PlateError::DataLoad(format!(
                "line {line}: invalid price {} for dish {}",
                self.price, self.id
            )));
        }
        if !self.rating.is_finite() || !(0.0..=5.0).contains(&self.rating) {
            return Err(PlateError::DataLoad(format!(
                "line {line}: rating {} for dish {} is outside 0-5",
                self.rating, self.id
            )));
        }
        Ok(Dish {
            id: self.id,
            name: self.name,
            restaurant: self.restaurant,
            cuisine: self.cuisine,
            category: self.category,
            price: self.price,
            rating: self.rating,
            dietary_tags: split_set(&self.dietary_tags),
            spice_level: self.spice_level,
            prep_time_mins: self.prep_time_mins.unwrap_or(0),
            tags: split_set(&self.tags),
            description: self.description,
        })
    }
}

fn split_set(cell: &str) -> BTreeSet<String> {
    cell.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory dish collection.  There are no mutation operations; the order
/// of [`Catalog::all`] is the file order and never changes.
#[derive(Debug, Clone)]
pub struct Catalog {
    dishes: Vec<Dish>,
}

impl Catalog {
    /// Load a catalog from the CSV file at `path`.
    ///
    /// # Errors
    ///
    /// [`PlateError::DataLoad`] when the file is missing, unreadable, lacks a
    /// required column, or contains a malformed row.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlateError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PlateError::DataLoad(format!("cannot open catalog at {}: {e}", path.display()))
        })?;
        let catalog = Self::from_reader(file)?;
        info!(path = %path.display(), dishes = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Parse a catalog from any CSV byte source.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PlateError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| PlateError::DataLoad(format!("cannot read header row: {e}")))?
            .clone();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|col| !headers.iter().any(|h| h == *col))
            .collect();
        if !missing.is_empty() {
            return Err(PlateError::DataLoad(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        let mut dishes = Vec::new();
        for (idx, row) in rdr.deserialize::<DishRow>().enumerate() {
            // Header is line 1.
            let line = idx + 2;
            let row = row.map_err(|e| PlateError::DataLoad(format!("line {line}: {e}")))?;
            dishes.push(row.into_dish(line)?);
        }
        Self::from_dishes(dishes)
    }

    /// Build a catalog from already-constructed dishes.
    ///
    /// # Errors
    ///
    /// [`PlateError::DataLoad`] when two dishes share an id.
    pub fn from_dishes(dishes: Vec<Dish>) -> Result<Self, PlateError> {
        let mut seen = HashSet::new();
        for dish in &dishes {
            if !seen.insert(dish.id.as_str()) {
                return Err(PlateError::DataLoad(format!("duplicate dish id {}", dish.id)));
            }
        }
        Ok(Self { dishes })
    }

    /// Stable-ordered snapshot of every dish.
    pub fn all(&self) -> &[Dish] {
        &self.dishes
    }

    pub fn get(&self, id: &str) -> Option<&Dish> {
        self.dishes.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.dishes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dishes.is_empty()
    }

    /// Headline numbers for the catalog overview screens.
    pub fn stats(&self) -> CatalogStats {
        let total = self.dishes.len();
        let vegetarian = self
            .dishes
            .iter()
            .filter(|d| d.dietary_tags.iter().any(|t| t.eq_ignore_ascii_case("vegetarian")))
            .count();
        let cuisines = self
            .dishes
            .iter()
            .map(|d| d.cuisine.to_lowercase())
            .collect::<HashSet<_>>()
            .len();
        let prices = self.dishes.iter().map(|d| d.price);
        let average_price = if total == 0 {
            0.0
        } else {
            prices.clone().sum::<f64>() / total as f64
        };
        CatalogStats {
            total,
            vegetarian,
            cuisines,
            average_price,
            min_price: prices.clone().reduce(f64::min).unwrap_or(0.0),
            max_price: prices.reduce(f64::max).unwrap_or(0.0),
        }
    }
}

/// Summary figures over the whole catalog.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub vegetarian: usize,
    pub cuisines: usize,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "\
id,name,cuisine,price,rating,dietary_tags,description
1,Veg Noodles,Chinese,150,4.2,veg; vegan ,Noodles
2,Lasagne,Italian,300,4.5,,Baked pasta
";

    #[test]
    fn parses_required_columns_only() {
        let catalog = Catalog::from_reader(SMALL.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);
        let first = &catalog.all()[0];
        assert_eq!(first.id, "1");
        assert_eq!(first.cuisine, "Chinese");
        assert!(first.dietary_tags.contains("veg"));
        assert!(first.dietary_tags.contains("vegan"));
        assert!(catalog.all()[1].dietary_tags.is_empty());
        assert_eq!(first.prep_time_mins, 0);
        assert!(first.restaurant.is_empty());
    }

    #[test]
    fn preserves_file_order() {
        let catalog = Catalog::from_reader(SMALL.as_bytes()).unwrap();
        let ids: Vec<&str> = catalog.all().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn missing_required_column_is_data_load_error() {
        let csv = "id,name,price,rating,dietary_tags,description\n1,A,1,1,,x\n";
        let err = Catalog::from_reader(csv.as_bytes()).unwrap_err();
        match err {
            PlateError::DataLoad(msg) => assert!(msg.contains("cuisine"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_numeric_price_is_data_load_error() {
        let csv = "id,name,cuisine,price,rating,dietary_tags,description\n1,A,X,cheap,4,,d\n";
        let err = Catalog::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, PlateError::DataLoad(ref m) if m.contains("line 2")));
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let csv = "id,name,cuisine,price,rating,dietary_tags,description\n1,A,X,10,7.5,,d\n";
        assert!(matches!(
            Catalog::from_reader(csv.as_bytes()),
            Err(PlateError::DataLoad(_))
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let csv = "id,name,cuisine,price,rating,dietary_tags,description\n1,A,X,10,4,,d\n1,B,Y,20,4,,e\n";
        assert!(matches!(
            Catalog::from_reader(csv.as_bytes()),
            Err(PlateError::DataLoad(ref m)) if m.contains("duplicate")
        ));
    }

    #[test]
    fn load_missing_file_is_data_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Catalog::load(dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, PlateError::DataLoad(_)));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dishes.csv");
        std::fs::write(&path, SMALL).unwrap();
        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.get("2").map(|d| d.name.as_str()), Some("Lasagne"));
        assert!(catalog.get("3").is_none());
    }

    #[test]
    fn stats_summarise_catalog() {
        let csv = "\
id,name,cuisine,price,rating,dietary_tags,description
1,A,Chinese,100,4,Vegetarian,x
2,B,chinese,200,4,Non-Vegetarian,y
3,C,Thai,300,4,vegetarian,z
";
        let stats = Catalog::from_reader(csv.as_bytes()).unwrap().stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.vegetarian, 2);
        assert_eq!(stats.cuisines, 2);
        assert!((stats.average_price - 200.0).abs() < 1e-9);
        assert_eq!(stats.min_price, 100.0);
        assert_eq!(stats.max_price, 300.0);
    }

    #[test]
    fn stats_of_empty_catalog_are_zero() {
        let stats = Catalog::from_dishes(Vec::new()).unwrap().stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_price, 0.0);
    }
}
