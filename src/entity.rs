use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The six logical entities of the warehouse and their table names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    User,
    Card,
    Store,
    Product,
    DateEvent,
    Order,
}

impl Entity {
    /// Dimensions first; the fact table is always loaded last.
    pub const ALL: [Entity; 6] = [
        Entity::User,
        Entity::Card,
        Entity::Store,
        Entity::Product,
        Entity::DateEvent,
        Entity::Order,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Entity::User => "dim_users",
            Entity::Card => "dim_card_details",
            Entity::Store => "dim_store_details",
            Entity::Product => "dim_products",
            Entity::DateEvent => "dim_date_times",
            Entity::Order => "orders_table",
        }
    }

    /// Primary key column for dimensions; the fact table has none.
    pub fn primary_key(&self) -> Option<&'static str> {
        match self {
            Entity::User => Some("user_uuid"),
            Entity::Card => Some("card_number"),
            Entity::Store => Some("store_code"),
            Entity::Product => Some("product_code"),
            Entity::DateEvent => Some("date_uuid"),
            Entity::Order => None,
        }
    }

    pub fn is_dimension(&self) -> bool {
        self.primary_key().is_some()
    }

    pub fn dimensions() -> impl Iterator<Item = Entity> {
        Self::ALL.into_iter().filter(Entity::is_dimension)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Entity::User => "user",
            Entity::Card => "card",
            Entity::Store => "store",
            Entity::Product => "product",
            Entity::DateEvent => "date-event",
            Entity::Order => "order",
        };
        f.write_str(label)
    }
}
