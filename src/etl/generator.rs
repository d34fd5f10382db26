//! Synthetic taxi-trip data.
//!
//! Trips are drawn uniformly from fixed value lists and ranges, then written
//! as CSV with a header row.

use crate::error::EtlResult;
use chrono::{Days, NaiveDate, NaiveTime};
use rand::Rng;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Columns of a generated file, in order.
pub const COLUMNS: [&str; 11] = [
    "pick_up_date",
    "pick_up_time",
    "drop_off_time",
    "trip_distance",
    "trip_fare",
    "payment_method",
    "cab_color",
    "pickup_location",
    "pickup_zone",
    "dropoff_location",
    "dropoff_zone",
];

pub const PAYMENT_METHODS: [&str; 6] = [
    "cash",
    "debit_card",
    "mobile_payment",
    "credit_card",
    "transit_card",
    "Venmo",
];

pub const CAB_COLORS: [&str; 5] = ["yellow", "green", "black", "white", "blue"];

pub const ZONES: [&str; 5] = [
    "airport",
    "business_district",
    "entertainment_district",
    "residential",
    "train_station",
];

/// New York City neighbourhoods used for pickup and dropoff locations.
pub const NEIGHBOURHOODS: &[&str] = &[
    "Lenox Hill West",
    "Upper West Side South",
    "Alphabet City",
    "Hudson Sq",
    "Midtown East",
    "Times Sq/Theatre District",
    "Battery Park City",
    "Murray Hill",
    "East Harlem South",
    "Lincoln Square East",
    "LaGuardia Airport",
    "Lincoln Square West",
    "Financial District North",
    "Upper West Side North",
    "East Chelsea",
    "Midtown Center",
    "Gramercy",
    "Penn Station/Madison Sq West",
    "Sutton Place/Turtle Bay North",
    "West Chelsea/Hudson Yards",
    "Clinton East",
    "Clinton West",
    "UN/Turtle Bay South",
    "Midtown South",
    "Midtown North",
    "Garment District",
    "Lenox Hill East",
    "Flatiron",
    "TriBeCa/Civic Center",
    "Upper East Side North",
    "West Village",
    "Greenwich Village South",
    "JFK Airport",
    "East Village",
    "Union Sq",
    "Yorkville West",
    "Central Park",
    "Meatpacking/West Village West",
    "Kips Bay",
    "Morningside Heights",
    "Astoria",
    "East Tremont",
    "Upper East Side South",
    "Financial District South",
    "Bloomingdale",
    "Queensboro Hill",
    "SoHo",
    "Brooklyn Heights",
    "Yorkville East",
    "Manhattan Valley",
    "DUMBO/Vinegar Hill",
    "Little Italy/NoLiTa",
    "Mott Haven/Port Morris",
    "Greenwich Village North",
    "Stuyvesant Heights",
    "Lower East Side",
    "East Harlem North",
    "Chinatown",
    "Fort Greene",
    "Steinway",
    "Central Harlem",
    "Crown Heights North",
    "Seaport",
    "Two Bridges/Seward Park",
    "Boerum Hill",
    "Williamsburg (South Side)",
    "Rosedale",
    "Flushing",
    "Old Astoria",
    "Soundview/Castle Hill",
    "Stuy Town/Peter Cooper Village",
    "World Trade Center",
    "Sunnyside",
    "Washington Heights South",
    "Prospect Heights",
    "East New York",
    "Hamilton Heights",
    "Cobble Hill",
    "Long Island City/Queens Plaza",
    "Central Harlem North",
    "Manhattanville",
    "East Flatbush/Farragut",
    "Elmhurst",
    "East Concourse/Concourse Village",
    "Park Slope",
    "Greenpoint",
    "Williamsburg (North Side)",
    "Long Island City/Hunters Point",
    "South Ozone Park",
    "Ridgewood",
    "Downtown Brooklyn/MetroTech",
    "Queensbridge/Ravenswood",
    "Williamsbridge/Olinville",
    "Bedford",
    "Gowanus",
    "Jackson Heights",
    "South Jamaica",
    "Bushwick North",
    "West Concourse",
    "Queens Village",
    "Windsor Terrace",
    "Flatlands",
    "Van Cortlandt Village",
    "Woodside",
    "East Williamsburg",
    "Fordham South",
    "East Elmhurst",
    "Kew Gardens",
    "Flushing Meadows-Corona Park",
    "Marine Park/Mill Basin",
    "Carroll Gardens",
    "Canarsie",
    "East Flatbush/Remsen Village",
    "Jamaica",
    "Marble Hill",
    "Bushwick South",
    "Erasmus",
    "Claremont/Bathgate",
    "Pelham Bay",
    "Soundview/Bruckner",
    "South Williamsburg",
    "Battery Park",
    "Forest Hills",
    "Maspeth",
    "Bronx Park",
    "Starrett City",
    "Brighton Beach",
    "Brownsville",
    "Highbridge Park",
    "Bensonhurst East",
    "Mount Hope",
    "Prospect-Lefferts Gardens",
    "Bayside",
    "Douglaston",
    "Midwood",
    "North Corona",
    "Homecrest",
    "Westchester Village/Unionport",
    "University Heights/Morris Heights",
    "Inwood",
    "Washington Heights North",
    "Flatbush/Ditmas Park",
    "Rego Park",
    "Riverdale/North Riverdale/Fieldston",
    "Jamaica Estates",
    "Borough Park",
    "Sunset Park West",
    "Belmont",
    "Auburndale",
    "Schuylerville/Edgewater Park",
    "Co-Op City",
    "Crown Heights South",
    "Spuyten Duyvil/Kingsbridge",
    "Morrisania/Melrose",
    "Hollis",
    "Parkchester",
    "Coney Island",
    "East Flushing",
    "Richmond Hill",
    "Bedford Park",
    "Highbridge",
    "Clinton Hill",
    "Sheepshead Bay",
    "Madison",
    "Dyker Heights",
    "Cambria Heights",
    "Pelham Parkway",
    "Hunts Point",
    "Melrose South",
    "Springfield Gardens North",
    "Bay Ridge",
    "Elmhurst/Maspeth",
    "Crotona Park East",
    "Bronxdale",
    "Briarwood/Jamaica Hills",
    "Van Nest/Morris Park",
    "Murray Hill-Queens",
    "Kingsbridge Heights",
    "Whitestone",
    "Saint Albans",
    "Allerton/Pelham Gardens",
    "Howard Beach",
    "Norwood",
    "Bensonhurst West",
    "Columbia Street",
    "Middle Village",
    "Prospect Park",
    "Ozone Park",
    "Gravesend",
    "Glendale",
    "Kew Gardens Hills",
    "Woodlawn/Wakefield",
    "West Farms/Bronx River",
    "Hillcrest/Pomonok",
];

const FIRST_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2023, 1, 1) {
    Some(date) => date,
    None => panic!("invalid first trip date"),
};

const LAST_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2025, 12, 31) {
    Some(date) => date,
    None => panic!("invalid last trip date"),
};

const SECONDS_PER_DAY: u32 = 86_400;

/// One generated trip. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripRecord {
    pub pick_up_date: NaiveDate,
    pub pick_up_time: NaiveTime,
    pub drop_off_time: NaiveTime,
    pub trip_distance: f64,
    pub trip_fare: f64,
    pub payment_method: &'static str,
    pub cab_color: &'static str,
    pub pickup_location: &'static str,
    pub pickup_zone: &'static str,
    pub dropoff_location: &'static str,
    pub dropoff_zone: &'static str,
}

impl TripRecord {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            pick_up_date: random_date(rng),
            pick_up_time: random_time(rng),
            drop_off_time: random_time(rng),
            trip_distance: round2(rng.gen_range(0.1..=100.0)),
            trip_fare: round2(rng.gen_range(10.0..=100.0)),
            payment_method: pick(rng, &PAYMENT_METHODS),
            cab_color: pick(rng, &CAB_COLORS),
            pickup_location: pick(rng, NEIGHBOURHOODS),
            pickup_zone: pick(rng, &ZONES),
            dropoff_location: pick(rng, NEIGHBOURHOODS),
            dropoff_zone: pick(rng, &ZONES),
        }
    }
}

fn random_date<R: Rng>(rng: &mut R) -> NaiveDate {
    let span = LAST_DATE.signed_duration_since(FIRST_DATE).num_days() as u64;
    FIRST_DATE
        .checked_add_days(Days::new(rng.gen_range(0..=span)))
        .unwrap_or(FIRST_DATE)
}

/// A uniformly random second of the day.
fn random_time<R: Rng>(rng: &mut R) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(rng.gen_range(0..SECONDS_PER_DAY), 0)
        .unwrap_or(NaiveTime::MIN)
}

fn pick<R: Rng>(rng: &mut R, values: &[&'static str]) -> &'static str {
    values[rng.gen_range(0..values.len())]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write `size` random trips to `path` as CSV.
///
/// Returns a summary line naming the file and the record count.
pub fn write_csv<R: Rng>(path: &Path, size: usize, rng: &mut R) -> EtlResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    // Written explicitly so an empty file still has its header
    writer.write_record(COLUMNS)?;
    for _ in 0..size {
        writer.serialize(TripRecord::random(rng))?;
    }
    writer.flush()?;

    info!(path = %path.display(), records = size, "Generated trip data");
    Ok(format!(
        "Data generation complete. CSV file created at: {} with {} records.",
        path.display(),
        size
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_random_trip_within_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let trip = TripRecord::random(&mut rng);
            assert!(trip.pick_up_date >= FIRST_DATE && trip.pick_up_date <= LAST_DATE);
            assert!((0.1..=100.0).contains(&trip.trip_distance));
            assert!((10.0..=100.0).contains(&trip.trip_fare));
            assert_eq!(round2(trip.trip_fare), trip.trip_fare);
            assert!(PAYMENT_METHODS.contains(&trip.payment_method));
            assert!(CAB_COLORS.contains(&trip.cab_color));
            assert!(NEIGHBOURHOODS.contains(&trip.pickup_location));
            assert!(ZONES.contains(&trip.dropoff_zone));
        }
    }

    #[test]
    fn test_same_seed_same_trips() {
        let a = TripRecord::random(&mut StdRng::seed_from_u64(42));
        let b = TripRecord::random(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_write_csv_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trips.csv");
        let mut rng = StdRng::seed_from_u64(1);

        let message = write_csv(&path, 25, &mut rng).unwrap();
        assert!(message.starts_with("Data generation complete. CSV file created at: "));
        assert!(message.ends_with(" with 25 records."));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, COLUMNS);
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 25);
        // YYYY-MM-DD and HH:MM:SS
        assert_eq!(records[0][0].len(), 10);
        assert_eq!(records[0][1].len(), 8);
    }

    #[test]
    fn test_write_csv_empty_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&path, 0, &mut StdRng::seed_from_u64(1)).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim_end(), COLUMNS.join(","));
    }
}
