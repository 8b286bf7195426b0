//! Generated demo rows for the local store.
//!
//! Row counts are fixed; values are random. A seeded generator with a fixed
//! `as_of` date reproduces the same rows.

use chrono::{Duration, NaiveDate, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::table::{CellValue, Table};

pub const PROPERTY_COUNT: usize = 100;
pub const TRANSACTION_COUNT: usize = 150;
pub const RENTAL_COUNT: usize = 60;
pub const MARKET_WEEKS: usize = 52;

pub const PROPERTY_TYPES: [&str; 4] = ["Single Family", "Condo", "Townhouse", "Multi-Family"];
pub const REGIONS: [&str; 4] = ["Downtown", "Suburbs", "Waterfront", "Historic District"];

const STREETS: [&str; 6] = ["Main", "Oak", "Pine", "Elm", "Maple", "Cedar"];
const TRANSACTION_TYPES: [&str; 4] = ["Sale", "Purchase", "Lease", "Refinance"];
const SOLD_SHARE: f64 = 0.7;
const OCCUPIED_SHARE: f64 = 0.85;

/// One generated batch, keyed by destination table.
#[derive(Debug, Clone, Serialize)]
pub struct SampleData {
    pub properties: Table,
    pub transactions: Table,
    pub rental_properties: Table,
    pub market_data: Table,
}

impl SampleData {
    pub fn tables(&self) -> [(&'static str, &Table); 4] {
        [
            ("properties", &self.properties),
            ("transactions", &self.transactions),
            ("rental_properties", &self.rental_properties),
            ("market_data", &self.market_data),
        ]
    }

    pub fn row_counts(&self) -> Vec<(&'static str, usize)> {
        self.tables().iter().map(|(name, t)| (*name, t.len())).collect()
    }
}

pub struct SampleDataGenerator {
    rng: ChaCha8Rng,
    as_of: NaiveDate,
}

impl Default for SampleDataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleDataGenerator {
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
            as_of: Utc::now().date_naive(),
        }
    }

    pub fn seeded(seed: u64, as_of: NaiveDate) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            as_of,
        }
    }

    pub fn generate(&mut self) -> SampleData {
        let properties = self.properties();
        let transactions = self.transactions();
        let rental_properties = self.rentals();
        let market_data = self.market_data();
        SampleData {
            properties,
            transactions,
            rental_properties,
            market_data,
        }
    }

    fn properties(&mut self) -> Table {
        let columns = columns(&[
            "id",
            "address",
            "property_type",
            "bedrooms",
            "bathrooms",
            "square_feet",
            "lot_size",
            "year_built",
            "listing_price",
            "sale_price",
            "listing_date",
            "sale_date",
            "days_on_market",
            "agent_id",
        ]);

        let rows = (1..=PROPERTY_COUNT as i64)
            .map(|id| {
                let square_feet = self.rng.gen_range(800..=4000) as f64;
                let listing_price = (square_feet * self.rng.gen_range(120.0..260.0)).round();
                let listed_days_ago = self.rng.gen_range(1..=365);
                let listing_date = self.as_of - Duration::days(listed_days_ago);

                let sold = self.rng.gen_bool(SOLD_SHARE);
                let (sale_price, sale_date, days_on_market) = if sold {
                    let dom = self.rng.gen_range(1..=listed_days_ago.min(180));
                    let price = (listing_price * self.rng.gen_range(0.90..1.05)).round();
                    (
                        CellValue::Real(price),
                        date_cell(listing_date + Duration::days(dom)),
                        CellValue::Integer(dom),
                    )
                } else {
                    (CellValue::Null, CellValue::Null, CellValue::Null)
                };

                vec![
                    CellValue::Integer(id),
                    CellValue::Text(format!(
                        "{} {} St",
                        self.rng.gen_range(100..=9999),
                        pick(&mut self.rng, &STREETS)
                    )),
                    pick(&mut self.rng, &PROPERTY_TYPES).into(),
                    CellValue::Integer(self.rng.gen_range(1..=5)),
                    CellValue::Integer(self.rng.gen_range(1..=4)),
                    CellValue::Real(square_feet),
                    CellValue::Real(round2(self.rng.gen_range(0.1..2.0))),
                    CellValue::Integer(self.rng.gen_range(1950..=2023)),
                    CellValue::Real(listing_price),
                    sale_price,
                    date_cell(listing_date),
                    sale_date,
                    days_on_market,
                    CellValue::Text(format!("AGENT_{:03}", self.rng.gen_range(1..=20))),
                ]
            })
            .collect();

        Table::with_rows(columns, rows)
    }

    fn transactions(&mut self) -> Table {
        let columns = columns(&[
            "property_id",
            "transaction_type",
            "amount",
            "transaction_date",
            "agent_id",
            "commission",
            "status",
        ]);

        let rows = (0..TRANSACTION_COUNT)
            .map(|_| {
                let kind = pick(&mut self.rng, &TRANSACTION_TYPES);
                let amount: f64 = match kind {
                    "Lease" => self.rng.gen_range(14_000.0..54_000.0),
                    _ => self.rng.gen_range(180_000.0..900_000.0),
                };
                let commission_rate = match kind {
                    "Sale" | "Purchase" => 0.03,
                    _ => 0.01,
                };
                let status = if self.rng.gen_bool(0.8) {
                    "Completed"
                } else if self.rng.gen_bool(0.5) {
                    "Pending"
                } else {
                    "Cancelled"
                };

                vec![
                    CellValue::Integer(self.rng.gen_range(1..=PROPERTY_COUNT as i64)),
                    kind.into(),
                    CellValue::Real(amount.round()),
                    date_cell(self.as_of - Duration::days(self.rng.gen_range(0..365))),
                    CellValue::Text(format!("AGENT_{:03}", self.rng.gen_range(1..=20))),
                    CellValue::Real(round2(amount * commission_rate)),
                    status.into(),
                ]
            })
            .collect();

        Table::with_rows(columns, rows)
    }

    fn rentals(&mut self) -> Table {
        let columns = columns(&[
            "property_id",
            "monthly_rent",
            "lease_start",
            "lease_end",
            "tenant_id",
            "occupancy_status",
            "last_maintenance",
        ]);

        let rows = (0..RENTAL_COUNT)
            .map(|_| {
                let lease_start = self.as_of - Duration::days(self.rng.gen_range(0..540));
                let term_months = pick(&mut self.rng, &[6_i64, 12, 12, 24]);
                let occupied = self.rng.gen_bool(OCCUPIED_SHARE);
                let tenant = if occupied {
                    CellValue::Text(format!("TENANT_{:04}", self.rng.gen_range(1..=9999)))
                } else {
                    CellValue::Null
                };

                vec![
                    CellValue::Integer(self.rng.gen_range(1..=PROPERTY_COUNT as i64)),
                    CellValue::Real(self.rng.gen_range(1200..=4500) as f64),
                    date_cell(lease_start),
                    date_cell(lease_start + Duration::days(term_months * 30)),
                    tenant,
                    CellValue::from(if occupied { "Occupied" } else { "Vacant" }),
                    date_cell(self.as_of - Duration::days(self.rng.gen_range(0..180))),
                ]
            })
            .collect();

        Table::with_rows(columns, rows)
    }

    /// Weekly rows, oldest first. Prices drift upward slightly so trends are
    /// visible in demos.
    fn market_data(&mut self) -> Table {
        let columns = columns(&[
            "date",
            "region",
            "median_price",
            "average_days_on_market",
            "inventory_count",
            "price_per_sqft",
            "rental_yield",
        ]);

        let bases: Vec<f64> = REGIONS
            .iter()
            .map(|_| self.rng.gen_range(320_000.0..520_000.0))
            .collect();

        let mut rows = Vec::with_capacity(MARKET_WEEKS * REGIONS.len());
        for week in 0..MARKET_WEEKS {
            let weeks_ago = (MARKET_WEEKS - 1 - week) as i64;
            let date = self.as_of - Duration::weeks(weeks_ago);
            for (region, base) in REGIONS.iter().zip(&bases) {
                let drift = 1.0 + 0.002 * week as f64;
                let median = (base * drift * self.rng.gen_range(0.96..1.04)).round();
                rows.push(vec![
                    date_cell(date),
                    (*region).into(),
                    CellValue::Real(median),
                    CellValue::Integer(self.rng.gen_range(20..=90)),
                    CellValue::Integer(self.rng.gen_range(50..=200)),
                    CellValue::Real(round2(self.rng.gen_range(150.0..400.0))),
                    CellValue::Real(round2(self.rng.gen_range(3.0..8.0))),
                ]);
            }
        }

        Table::with_rows(columns, rows)
    }
}

fn pick<T: Copy>(rng: &mut ChaCha8Rng, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn date_cell(date: NaiveDate) -> CellValue {
    CellValue::Text(date.format("%Y-%m-%d").to_string())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()
    }

    #[test]
    fn row_counts_are_fixed() {
        let data = SampleDataGenerator::seeded(7, as_of()).generate();
        assert_eq!(
            data.row_counts(),
            vec![
                ("properties", PROPERTY_COUNT),
                ("transactions", TRANSACTION_COUNT),
                ("rental_properties", RENTAL_COUNT),
                ("market_data", MARKET_WEEKS * REGIONS.len()),
            ]
        );
    }

    #[test]
    fn same_seed_same_rows() {
        let a = SampleDataGenerator::seeded(42, as_of()).generate();
        let b = SampleDataGenerator::seeded(42, as_of()).generate();
        assert_eq!(a.properties, b.properties);
        assert_eq!(a.market_data, b.market_data);
    }

    #[test]
    fn sold_properties_carry_sale_fields_and_sell_before_as_of() {
        let data = SampleDataGenerator::seeded(3, as_of()).generate();
        let today = as_of().format("%Y-%m-%d").to_string();
        for row in 0..data.properties.len() {
            let sale_date = data.properties.get(row, "sale_date").unwrap();
            let sale_price = data.properties.get(row, "sale_price").unwrap();
            assert_eq!(sale_date.is_null(), sale_price.is_null());
            if let Some(date) = sale_date.as_str() {
                assert!(date <= today.as_str());
            }
        }
        assert!(data.properties.column_f64("sale_price").len() > 40);
    }

    #[test]
    fn transaction_amounts_are_whole_dollars_with_matching_commission() {
        let data = SampleDataGenerator::seeded(11, as_of()).generate();
        for row in 0..data.transactions.len() {
            let kind = data.transactions.get(row, "transaction_type").unwrap().as_str().unwrap();
            let amount = data.transactions.get(row, "amount").unwrap().as_f64().unwrap();
            let commission = data.transactions.get(row, "commission").unwrap().as_f64().unwrap();
            assert_eq!(amount, amount.round());
            let (low, high, rate) = match kind {
                "Lease" => (14_000.0, 54_000.0, 0.01),
                "Sale" | "Purchase" => (180_000.0, 900_000.0, 0.03),
                _ => (180_000.0, 900_000.0, 0.01),
            };
            assert!((low..=high).contains(&amount), "{kind} amount {amount}");
            assert!((commission - amount * rate).abs() < 0.05);
        }
    }
}
