//! Placeholder property search over a fixed sample set

use super::{Capability, CapabilityError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Filters a small built-in listing set by location, price and listing type
pub struct PropertySearchTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ListingType {
    Rent,
    Sale,
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    location: String,
    #[serde(default)]
    max_price: Option<u64>,
    #[serde(default)]
    listing_type: Option<ListingType>,
}

#[derive(Debug, Clone, Serialize)]
struct Listing {
    id: &'static str,
    title: &'static str,
    location: &'static str,
    price: u64,
    currency: &'static str,
    listing_type: ListingType,
    bedrooms: u8,
}

const LISTINGS: &[Listing] = &[
    Listing {
        id: "tky-001",
        title: "1LDK near Shibuya station",
        location: "Tokyo",
        price: 95_000,
        currency: "JPY",
        listing_type: ListingType::Rent,
        bedrooms: 1,
    },
    Listing {
        id: "tky-002",
        title: "Family apartment in Setagaya",
        location: "Tokyo",
        price: 180_000,
        currency: "JPY",
        listing_type: ListingType::Rent,
        bedrooms: 3,
    },
    Listing {
        id: "tky-003",
        title: "Renovated condo in Meguro",
        location: "Tokyo",
        price: 62_000_000,
        currency: "JPY",
        listing_type: ListingType::Sale,
        bedrooms: 2,
    },
    Listing {
        id: "lon-001",
        title: "Studio flat in Camden",
        location: "London",
        price: 1_650,
        currency: "GBP",
        listing_type: ListingType::Rent,
        bedrooms: 0,
    },
    Listing {
        id: "nyc-001",
        title: "Two-bedroom walk-up in Astoria",
        location: "New York",
        price: 2_900,
        currency: "USD",
        listing_type: ListingType::Rent,
        bedrooms: 2,
    },
];

#[async_trait]
impl Capability for PropertySearchTool {
    fn name(&self) -> &'static str {
        "search_properties"
    }

    fn description(&self) -> String {
        "Search property listings by city. Optionally filter by maximum price (in the listing's \
         local currency) and by whether the property is for rent or for sale."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["location"],
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City to search in"
                },
                "max_price": {
                    "type": "integer",
                    "description": "Maximum price or monthly rent"
                },
                "listing_type": {
                    "type": "string",
                    "enum": ["rent", "sale"]
                }
            }
        })
    }

    async fn run(&self, arguments: Value) -> Result<Value, CapabilityError> {
        let input: SearchInput = serde_json::from_value(arguments)
            .map_err(|e| CapabilityError::InvalidArguments(e.to_string()))?;

        let location = input.location.trim();
        if location.is_empty() {
            return Err(CapabilityError::InvalidArguments(
                "location must not be empty".to_string(),
            ));
        }

        let matches: Vec<&Listing> = LISTINGS
            .iter()
            .filter(|l| l.location.eq_ignore_ascii_case(location))
            .filter(|l| input.max_price.is_none_or(|max| l.price <= max))
            .filter(|l| input.listing_type.is_none_or(|t| l.listing_type == t))
            .collect();

        let listings = serde_json::to_value(&matches)
            .map_err(|e| CapabilityError::Failed(format!("Could not encode listings: {e}")))?;
        Ok(json!({
            "count": matches.len(),
            "listings": listings,
        }))
    }
}
