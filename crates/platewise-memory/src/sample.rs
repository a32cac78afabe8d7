//! Demo user with a realistic history, for first-run walkthroughs.

use chrono::{Duration, Utc};
use platewise_types::{Dish, Feedback};

use crate::record::{MemoryRecord, PreferenceUpdate};
use crate::store::{MemoryStore, SaveStatus};

pub const SAMPLE_USER_ID: &str = "user_demo_001";

/// (id, name, restaurant, cuisine, price, tags, rating, comment)
type SampleOrder = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    f64,
    &'static [&'static str],
    f32,
    &'static str,
);

const SAMPLE_ORDERS: [SampleOrder; 5] = [
    (
        "D004",
        "Chicken Biryani",
        "Biryani Blues",
        "Hyderabadi",
        350.0,
        &["Non-Vegetarian", "Aromatic", "Filling", "Traditional"],
        5.0,
        "Absolutely loved it! The spices were perfect and chicken was tender.",
    ),
    (
        "D006",
        "Masala Dosa",
        "South Spice",
        "South Indian",
        120.0,
        &["Vegetarian", "Crispy", "Traditional", "Healthy"],
        4.0,
        "Crispy and delicious, but could use more potato filling.",
    ),
    (
        "D001",
        "Butter Chicken",
        "Punjab Grill",
        "North Indian",
        380.0,
        &["Non-Vegetarian", "Creamy", "Popular", "Rich"],
        3.0,
        "Too creamy for my taste, felt heavy.",
    ),
    (
        "D005",
        "Veg Hakka Noodles",
        "Wok Express",
        "Chinese",
        180.0,
        &["Vegetarian", "Quick", "Light", "Stir-Fried"],
        4.5,
        "Quick and tasty, perfect for a light meal.",
    ),
    (
        "D008",
        "Chocolate Brownie",
        "Dessert Dreams",
        "Continental",
        150.0,
        &["Vegetarian", "Sweet", "Chocolatey", "Indulgent"],
        5.0,
        "Rich and decadent! Perfect dessert.",
    ),
];

const SAMPLE_PREFERENCES: [(&str, &str); 4] = [
    ("dietary", "Non-Vegetarian"),
    ("spice_preference", "Medium to High"),
    ("cuisine_favorites", "Biryani, South Indian, Chinese"),
    ("budget_range", "₹150-400 per dish"),
];

/// Build the demo user's record: five rated orders spread over the last
/// five days plus four stated preferences.  Ratings of 4 and above count as
/// likes.
pub fn sample_record() -> MemoryRecord {
    let mut record = MemoryRecord::new(SAMPLE_USER_ID);
    let now = Utc::now();
    let count = SAMPLE_ORDERS.len() as i64;
    for (i, (id, name, restaurant, cuisine, price, tags, rating, comment)) in
        SAMPLE_ORDERS.into_iter().enumerate()
    {
        let dish = Dish::new(id, name, cuisine, price, 0.0)
            .with_restaurant(restaurant)
            .with_tags(tags.iter().copied());
        let mut feedback = if rating >= 4.0 {
            Feedback::like()
        } else {
            Feedback::dislike()
        }
        .with_rating(rating)
        .with_comment(comment);
        feedback.timestamp = now - Duration::days(count - i as i64);
        record.apply_permanent(PreferenceUpdate::Feedback { dish, feedback });
    }
    for (key, value) in SAMPLE_PREFERENCES {
        record.apply_permanent(PreferenceUpdate::Set {
            key: key.into(),
            value: value.into(),
        });
    }
    record
}

/// Write the demo user into `store`, replacing any existing record.  A
/// store that cannot persist still hands back the record for in-memory use.
pub fn seed_sample_user(store: &mut MemoryStore) -> (MemoryRecord, SaveStatus) {
    let record = sample_record();
    let status = store.save(&record);
    (record, status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_has_five_orders_and_four_preferences() {
        let r = sample_record();
        assert_eq!(r.permanent.order_history.len(), 5);
        assert_eq!(r.permanent.recent_feedback.len(), 5);
        assert_eq!(r.permanent.preferences.len(), 4);
        assert_eq!(r.permanent.order_history[0].dish_id, "D004");
        // Butter chicken got a 3: counted as a dislike.
        assert_eq!(r.permanent.cuisine_affinity["North Indian"], -1);
        assert_eq!(r.permanent.tag_affinity["Traditional"], 2);
    }

    #[test]
    fn sample_orders_are_chronological() {
        let r = sample_record();
        let orders = &r.permanent.order_history;
        assert!(orders.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn seeding_writes_a_loadable_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::open(dir.path());
        let (seeded, status) = seed_sample_user(&mut store);
        assert!(status.is_saved());
        assert_eq!(store.load(SAMPLE_USER_ID).unwrap(), seeded);
        assert!(seeded.summary().contains("Chicken Biryani from Biryani Blues"));
    }

    #[test]
    fn seeding_session_only_store_still_returns_record() {
        let mut store = MemoryStore::session_only();
        let (seeded, status) = seed_sample_user(&mut store);
        assert!(!status.is_saved());
        assert_eq!(seeded.user_id, SAMPLE_USER_ID);
    }
}
