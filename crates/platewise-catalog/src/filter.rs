//! Filter engine – narrows a catalog snapshot with declarative constraints.
//!
//! Every [`Constraint`] is first compiled into a [`Predicate`]; compilation
//! is where unknown fields and ill-shaped values are rejected with
//! [`PlateError::InvalidConstraint`].  A dish survives [`apply`] only when
//! every predicate matches it (logical AND), and the surviving dishes keep
//! their catalog order.
//!
//! ```
//! use platewise_catalog::filter;
//! use platewise_types::{Constraint, Dish};
//!
//! let dishes = vec![
//!     Dish::new("1", "Veg Noodles", "Chinese", 150.0, 4.2).with_dietary_tags(["veg"]),
//!     Dish::new("2", "Lasagne", "Italian", 300.0, 4.5),
//! ];
//! let cheap = filter::apply(&dishes, &[Constraint::range("price", Some(0.0), Some(200.0))]).unwrap();
//! assert_eq!(cheap.len(), 1);
//! assert_eq!(cheap[0].id, "1");
//! ```

use std::collections::BTreeSet;

use platewise_types::{Constraint, ConstraintValue, Dish, Operator, PlateError};

/// Tolerance used for numeric equality.
const EPSILON: f64 = 1e-9;

// ─────────────────────────────────────────────────────────────────────────────
// Fields
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Name,
    Restaurant,
    Cuisine,
    Category,
    Price,
    Rating,
    DietaryTags,
    SpiceLevel,
    PrepTime,
    Tags,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Number,
    Set,
}

impl Field {
    /// Resolve a field name.  Also accepts the column names of the original
    /// dataset export (`dish_id`, `dish_name`, `dietary`).
    fn parse(name: &str) -> Option<Self> {
        let field = match name.trim().to_ascii_lowercase().as_str() {
            "id" | "dish_id" => Field::Id,
            "name" | "dish_name" => Field::Name,
            "restaurant" => Field::Restaurant,
            "cuisine" => Field::Cuisine,
            "category" => Field::Category,
            "price" => Field::Price,
            "rating" => Field::Rating,
            "dietary_tags" | "dietary" => Field::DietaryTags,
            "spice_level" => Field::SpiceLevel,
            "prep_time_mins" => Field::PrepTime,
            "tags" => Field::Tags,
            "description" => Field::Description,
            _ => return None,
        };
        Some(field)
    }

    fn kind(self) -> FieldKind {
        match self {
            Field::Price | Field::Rating | Field::PrepTime => FieldKind::Number,
            Field::DietaryTags | Field::Tags => FieldKind::Set,
            _ => FieldKind::Text,
        }
    }

    fn text(self, dish: &Dish) -> &str {
        match self {
            Field::Id => &dish.id,
            Field::Name => &dish.name,
            Field::Restaurant => &dish.restaurant,
            Field::Cuisine => &dish.cuisine,
            Field::Category => &dish.category,
            Field::SpiceLevel => &dish.spice_level,
            Field::Description => &dish.description,
            _ => "",
        }
    }

    fn number(self, dish: &Dish) -> f64 {
        match self {
            Field::Price => dish.price,
            Field::Rating => dish.rating,
            Field::PrepTime => f64::from(dish.prep_time_mins),
            _ => f64::NAN,
        }
    }

    fn set(self, dish: &Dish) -> &BTreeSet<String> {
        match self {
            Field::Tags => &dish.tags,
            _ => &dish.dietary_tags,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Predicates
// ─────────────────────────────────────────────────────────────────────────────

/// A validated, ready-to-evaluate constraint.
#[derive(Debug, Clone)]
enum Predicate {
    TextIn(Field, Vec<String>),
    NumberIn(Field, Vec<f64>),
    NumberRange { field: Field, min: f64, max: f64 },
    SetAny(Field, Vec<String>),
}

impl Predicate {
    fn matches(&self, dish: &Dish) -> bool {
        match self {
            Predicate::TextIn(field, wanted) => {
                let actual = field.text(dish).trim().to_lowercase();
                wanted.iter().any(|w| *w == actual)
            }
            Predicate::NumberIn(field, wanted) => {
                let actual = field.number(dish);
                wanted.iter().any(|w| (w - actual).abs() < EPSILON)
            }
            Predicate::NumberRange { field, min, max } => {
                let actual = field.number(dish);
                actual >= *min && actual <= *max
            }
            Predicate::SetAny(field, wanted) => field
                .set(dish)
                .iter()
                .any(|member| wanted.contains(&member.trim().to_lowercase())),
        }
    }
}

fn normalise(s: &str) -> String {
    s.trim().to_lowercase()
}

fn compile(constraint: &Constraint) -> Result<Predicate, PlateError> {
    let name = constraint.field.as_str();
    let invalid = |reason: &str| PlateError::invalid_constraint(name, reason);
    let field = Field::parse(name).ok_or_else(|| invalid("unknown field"))?;

    match (constraint.op, field.kind(), &constraint.value) {
        // ── equals ──────────────────────────────────────────────────────────
        (Operator::Equals, FieldKind::Text, ConstraintValue::Text(v)) => {
            Ok(Predicate::TextIn(field, vec![normalise(v)]))
        }
        (Operator::Equals, FieldKind::Set, ConstraintValue::Text(v)) => {
            Ok(Predicate::SetAny(field, vec![normalise(v)]))
        }
        (Operator::Equals, FieldKind::Number, ConstraintValue::Number(n)) => {
            Ok(Predicate::NumberIn(field, vec![*n]))
        }
        (Operator::Equals, FieldKind::Number, ConstraintValue::Text(v)) => v
            .trim()
            .parse::<f64>()
            .map(|n| Predicate::NumberIn(field, vec![n]))
            .map_err(|_| invalid("expected a number")),

        // ── range ───────────────────────────────────────────────────────────
        (Operator::Range, FieldKind::Number, ConstraintValue::Numbers(bounds)) => {
            let [lo, hi] = bounds.as_slice() else {
                return Err(invalid("range needs exactly two bounds [min, max]"));
            };
            if lo.is_none() && hi.is_none() {
                return Err(invalid("range needs at least one bound"));
            }
            let min = lo.unwrap_or(f64::NEG_INFINITY);
            let max = hi.unwrap_or(f64::INFINITY);
            if min.is_nan() || max.is_nan() || min > max {
                return Err(invalid("range lower bound exceeds upper bound"));
            }
            Ok(Predicate::NumberRange { field, min, max })
        }
        (Operator::Range, FieldKind::Number, _) => Err(invalid("range needs [min, max]")),
        (Operator::Range, _, _) => Err(invalid("range applies only to numeric fields")),

        // ── in_set ──────────────────────────────────────────────────────────
        (Operator::InSet, FieldKind::Text | FieldKind::Set, ConstraintValue::Text(v)) => {
            Ok(text_set(field, vec![normalise(v)]))
        }
        (Operator::InSet, FieldKind::Text | FieldKind::Set, ConstraintValue::Texts(vs)) => {
            if vs.is_empty() {
                return Err(invalid("in_set needs at least one value"));
            }
            Ok(text_set(field, vs.iter().map(|v| normalise(v)).collect()))
        }
        (Operator::InSet, FieldKind::Number, ConstraintValue::Number(n)) => {
            Ok(Predicate::NumberIn(field, vec![*n]))
        }
        (Operator::InSet, FieldKind::Number, ConstraintValue::Numbers(ns)) => {
            let values: Option<Vec<f64>> = ns.iter().copied().collect();
            match values {
                Some(values) if !values.is_empty() => Ok(Predicate::NumberIn(field, values)),
                _ => Err(invalid("in_set needs a non-empty list of numbers")),
            }
        }

        _ => Err(invalid("value does not fit the operator and field type")),
    }
}

fn text_set(field: Field, values: Vec<String>) -> Predicate {
    if field.kind() == FieldKind::Set {
        Predicate::SetAny(field, values)
    } else {
        Predicate::TextIn(field, values)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Check that `constraint` names a known field and carries a value of the
/// right shape for its operator.
pub fn validate(constraint: &Constraint) -> Result<(), PlateError> {
    compile(constraint).map(|_| ())
}

/// Split `constraints` into the usable ones and the rejected ones (with the
/// reason each was rejected).  Input order is preserved on both sides.
pub fn partition_valid(
    constraints: Vec<Constraint>,
) -> (Vec<Constraint>, Vec<(Constraint, PlateError)>) {
    let mut valid = Vec::with_capacity(constraints.len());
    let mut rejected = Vec::new();
    for c in constraints {
        match validate(&c) {
            Ok(()) => valid.push(c),
            Err(e) => rejected.push((c, e)),
        }
    }
    (valid, rejected)
}

/// Return the dishes of `snapshot` that satisfy every constraint, in
/// snapshot order.  An empty constraint list returns the snapshot unchanged.
///
/// # Errors
///
/// [`PlateError::InvalidConstraint`] for the first constraint that names an
/// unknown field or carries an ill-shaped value; nothing is filtered in that
/// case.
pub fn apply(snapshot: &[Dish], constraints: &[Constraint]) -> Result<Vec<Dish>, PlateError> {
    let predicates = constraints
        .iter()
        .map(compile)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(snapshot
        .iter()
        .filter(|dish| predicates.iter().all(|p| p.matches(dish)))
        .cloned()
        .collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::default_catalog;

    fn two_dishes() -> Vec<Dish> {
        vec![
            Dish::new("1", "Veg Noodles", "Chinese", 150.0, 4.2).with_dietary_tags(["veg"]),
            Dish::new("2", "Lasagne", "Italian", 300.0, 4.5),
        ]
    }

    fn ids(dishes: &[Dish]) -> Vec<&str> {
        dishes.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn price_range_keeps_only_cheap_dish() {
        let out = apply(&two_dishes(), &[Constraint::range("price", Some(0.0), Some(200.0))]).unwrap();
        assert_eq!(ids(&out), ["1"]);
    }

    #[test]
    fn empty_constraints_return_snapshot_unchanged() {
        let catalog = default_catalog().unwrap();
        let out = apply(catalog.all(), &[]).unwrap();
        assert_eq!(out, catalog.all());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let dishes = two_dishes();
        let out = apply(&dishes, &[Constraint::range("price", Some(150.0), Some(300.0))]).unwrap();
        assert_eq!(ids(&out), ["1", "2"]);
    }

    #[test]
    fn open_upper_bound() {
        let out = apply(&two_dishes(), &[Constraint::range("rating", Some(4.3), None)]).unwrap();
        assert_eq!(ids(&out), ["2"]);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = apply(&two_dishes(), &[Constraint::equals("colour", "red")]).unwrap_err();
        assert!(matches!(err, PlateError::InvalidConstraint { ref field, .. } if field == "colour"));
    }

    #[test]
    fn range_on_text_field_is_rejected() {
        let c = Constraint::range("cuisine", Some(1.0), Some(2.0));
        assert!(matches!(validate(&c), Err(PlateError::InvalidConstraint { .. })));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let c = Constraint::range("price", Some(500.0), Some(100.0));
        assert!(validate(&c).is_err());
    }

    #[test]
    fn range_with_one_bound_value_is_rejected() {
        let c = Constraint {
            field: "price".into(),
            op: Operator::Range,
            value: ConstraintValue::Numbers(vec![Some(1.0)]),
        };
        assert!(validate(&c).is_err());
    }

    #[test]
    fn set_membership_is_case_insensitive() {
        let out = apply(&two_dishes(), &[Constraint::in_set("dietary_tags", ["VEG", "vegan"])]).unwrap();
        assert_eq!(ids(&out), ["1"]);
    }

    #[test]
    fn text_equality_is_case_insensitive() {
        let out = apply(&two_dishes(), &[Constraint::equals("cuisine", " italian ")]).unwrap();
        assert_eq!(ids(&out), ["2"]);
    }

    #[test]
    fn equals_on_set_field_means_contains() {
        let out = apply(&two_dishes(), &[Constraint::equals("dietary", "Veg")]).unwrap();
        assert_eq!(ids(&out), ["1"]);
    }

    #[test]
    fn numeric_equality_accepts_text_number() {
        let out = apply(&two_dishes(), &[Constraint::equals("price", "300")]).unwrap();
        assert_eq!(ids(&out), ["2"]);
    }

    #[test]
    fn numeric_in_set() {
        let c = Constraint {
            field: "price".into(),
            op: Operator::InSet,
            value: ConstraintValue::Numbers(vec![Some(150.0), Some(999.0)]),
        };
        assert_eq!(ids(&apply(&two_dishes(), &[c]).unwrap()), ["1"]);
    }

    #[test]
    fn empty_in_set_is_rejected() {
        let c = Constraint::in_set("cuisine", Vec::<String>::new());
        assert!(validate(&c).is_err());
    }

    #[test]
    fn constraints_are_anded() {
        let catalog = default_catalog().unwrap();
        let out = apply(
            catalog.all(),
            &[
                Constraint::in_set("dietary_tags", ["vegetarian"]),
                Constraint::range("price", None, Some(150.0)),
                Constraint::equals("cuisine", "South Indian"),
            ],
        )
        .unwrap();
        assert_eq!(ids(&out), ["D006", "D015"]);
    }

    #[test]
    fn results_never_contain_false_positives() {
        let catalog = default_catalog().unwrap();
        let constraints = [
            Constraint::range("price", Some(100.0), Some(300.0)),
            Constraint::in_set("tags", ["quick", "Traditional"]),
        ];
        let out = apply(catalog.all(), &constraints).unwrap();
        assert!(!out.is_empty());
        for dish in &out {
            assert!((100.0..=300.0).contains(&dish.price), "{} price", dish.id);
            assert!(
                dish.tags.iter().any(|t| t == "Quick" || t == "Traditional"),
                "{} tags",
                dish.id
            );
        }
        // And nothing that satisfies both was left out.
        let expected = catalog
            .all()
            .iter()
            .filter(|d| {
                (100.0..=300.0).contains(&d.price)
                    && d.tags.iter().any(|t| t == "Quick" || t == "Traditional")
            })
            .count();
        assert_eq!(out.len(), expected);
    }

    #[test]
    fn partition_separates_invalid_constraints() {
        let (valid, rejected) = partition_valid(vec![
            Constraint::equals("cuisine", "Thai"),
            Constraint::equals("colour", "red"),
            Constraint::range("price", Some(0.0), Some(100.0)),
        ]);
        assert_eq!(valid.len(), 2);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0.field, "colour");
    }

    #[test]
    fn invalid_constraint_fails_whole_apply() {
        let result = apply(
            &two_dishes(),
            &[Constraint::equals("cuisine", "Chinese"), Constraint::equals("nope", "x")],
        );
        assert!(result.is_err());
    }
}
