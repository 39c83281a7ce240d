//! Field set for the first booking form

use crate::catalog::AirportIndex;
use crate::FlightError;
use chrono::NaiveDate;

/// Every field the first booking form must receive, in submission order.
pub const REQUIRED_FIELDS: [&str; 20] = [
    "triptype",
    "_from",
    "_to",
    "_auto_from",
    "_auto_to",
    "_depart",
    "_return",
    "_depday",
    "_depmonthyear",
    "_retday",
    "_retmonthyear",
    "B_ANY_TIME_1",
    "B_ANY_TIME_2",
    "B_DATE_1",
    "B_DATE_2",
    "B_FLOW",
    "B_LOCATION_1",
    "E_LOCATION_1",
    "TRIP_TYPE",
    "flexMyDates",
];

/// Fields that only carry data for return trips
pub const RETURN_FIELDS: [&str; 4] = ["_return", "_retday", "_retmonthyear", "B_DATE_2"];

pub const ONE_WAY_TRIP_TYPE: &str = "O";
pub const RETURN_TRIP_TYPE: &str = "R";

/// Form field name/value pairs, ordered as submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormOptions {
    fields: Vec<(String, String)>,
}

impl FormOptions {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse a `YYYYMMDD` date
pub fn parse_date(date: &str) -> Result<NaiveDate, FlightError> {
    NaiveDate::parse_from_str(date, "%Y%m%d")
        .map_err(|_| FlightError::DateParseError(format!("expected YYYYMMDD, got {}", date)))
}

/// Build the first form's fields for a trip between two catalog cities.
///
/// Date layouts are fixed by the booking site: `DD/MM/YY` for the visible
/// date fields, `YYYYMMDD0000` for `B_DATE_*` and `YYYY-MM` for the month
/// selectors. Return fields are sent empty on one-way trips.
pub fn build_options(
    from_city: &str,
    to_city: &str,
    depart_date: NaiveDate,
    return_date: Option<NaiveDate>,
    index: &AirportIndex,
) -> Result<FormOptions, FlightError> {
    let from_code = index
        .resolve(from_city)
        .ok_or_else(|| FlightError::UnknownCity(from_city.to_string()))?
        .code
        .clone();
    let to_code = index
        .resolve(to_city)
        .ok_or_else(|| FlightError::UnknownCity(to_city.to_string()))?
        .code
        .clone();

    let fmt_return = |pattern: &str| {
        return_date
            .map(|date| date.format(pattern).to_string())
            .unwrap_or_default()
    };

    let (triptype, trip_type) = if return_date.is_some() {
        ("return", RETURN_TRIP_TYPE)
    } else {
        ("oneway", ONE_WAY_TRIP_TYPE)
    };

    let values = [
        triptype.to_string(),
        from_code.clone(),
        to_code.clone(),
        from_city.to_string(),
        to_city.to_string(),
        depart_date.format("%d/%m/%y").to_string(),
        fmt_return("%d/%m/%y"),
        depart_date.format("%d").to_string(),
        depart_date.format("%Y-%m").to_string(),
        fmt_return("%d"),
        fmt_return("%Y-%m"),
        "TRUE".to_string(),
        "TRUE".to_string(),
        depart_date.format("%Y%m%d0000").to_string(),
        fmt_return("%Y%m%d0000"),
        "flight".to_string(),
        from_code,
        to_code,
        trip_type.to_string(),
        // flexible dates stay off
        "0".to_string(),
    ];

    let fields = REQUIRED_FIELDS
        .iter()
        .zip(values)
        .map(|(name, value)| (name.to_string(), value))
        .collect();

    Ok(FormOptions { fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Airport;

    fn airport(code: &str, short_name: &str, safe_name: &str) -> Airport {
        Airport {
            code: code.to_string(),
            short_name: short_name.to_string(),
            safe_name: safe_name.to_string(),
            display_name: None,
        }
    }

    fn index() -> AirportIndex {
        let airports = vec![
            airport("LON", "London", "london"),
            airport("AMS", "Amsterdam", "amsterdam"),
        ];
        AirportIndex::new(&airports)
    }

    #[test]
    fn test_one_way_options() {
        let depart = parse_date("20240115").unwrap();
        let options = build_options("london", "amsterdam", depart, None, &index()).unwrap();

        assert_eq!(options.get("_from"), Some("LON"));
        assert_eq!(options.get("_to"), Some("AMS"));
        assert_eq!(options.get("_auto_from"), Some("london"));
        assert_eq!(options.get("_depart"), Some("15/01/24"));
        assert_eq!(options.get("_depday"), Some("15"));
        assert_eq!(options.get("_depmonthyear"), Some("2024-01"));
        assert_eq!(options.get("B_DATE_1"), Some("202401150000"));
        assert_eq!(options.get("B_LOCATION_1"), Some("LON"));
        assert_eq!(options.get("E_LOCATION_1"), Some("AMS"));
        assert_eq!(options.get("triptype"), Some("oneway"));
        assert_eq!(options.get("TRIP_TYPE"), Some(ONE_WAY_TRIP_TYPE));
        assert_eq!(options.get("flexMyDates"), Some("0"));
        assert_eq!(options.get("B_ANY_TIME_1"), Some("TRUE"));
        assert_eq!(options.get("B_ANY_TIME_2"), Some("TRUE"));
        assert_eq!(options.get("B_FLOW"), Some("flight"));

        for field in RETURN_FIELDS {
            assert_eq!(options.get(field), Some(""), "{} should be empty", field);
        }
    }

    #[test]
    fn test_every_required_field_present() {
        let depart = parse_date("20241231").unwrap();
        let ret = parse_date("20250103").unwrap();
        for return_date in [None, Some(ret)] {
            let options = build_options("London", "Amsterdam", depart, return_date, &index()).unwrap();
            assert_eq!(options.len(), REQUIRED_FIELDS.len());
            for field in REQUIRED_FIELDS {
                assert!(options.get(field).is_some(), "missing {}", field);
            }
        }
    }

    #[test]
    fn test_every_catalog_route_builds() {
        let catalog = crate::catalog::parse_catalog(
            r#"function({"airports": [
                {"code": "LCY", "shortname": "London", "safe_name": "london"},
                {"code": "AMS", "shortname": "Amsterdam", "safe_name": "amsterdam"},
                {"code": "DUB", "shortname": "Dublin", "safe_name": "dublin"}
            ], "routes": [["LCY", "AMS"], ["AMS", "LCY"], ["LCY", "DUB"], ["DUB", "AMS"]]});"#,
        )
        .unwrap();
        let index = catalog.index();
        let depart = parse_date("20240601").unwrap();

        for route in catalog.routes() {
            let options = build_options(&route.origin, &route.destination, depart, None, &index).unwrap();
            assert_eq!(options.len(), REQUIRED_FIELDS.len(), "{}", route);
            assert_ne!(options.get("_from"), options.get("_to"));
        }
    }

    #[test]
    fn test_return_options() {
        let depart = parse_date("20241231").unwrap();
        let ret = parse_date("20250103").unwrap();
        let options = build_options("London", "Amsterdam", depart, Some(ret), &index()).unwrap();

        assert_eq!(options.get("triptype"), Some("return"));
        assert_eq!(options.get("TRIP_TYPE"), Some(RETURN_TRIP_TYPE));
        assert_eq!(options.get("_return"), Some("03/01/25"));
        assert_eq!(options.get("_retday"), Some("03"));
        assert_eq!(options.get("_retmonthyear"), Some("2025-01"));
        assert_eq!(options.get("B_DATE_2"), Some("202501030000"));
        assert_eq!(options.get("_depmonthyear"), Some("2024-12"));
    }

    #[test]
    fn test_unknown_city() {
        let depart = parse_date("20240115").unwrap();
        match build_options("Paris", "Amsterdam", depart, None, &index()) {
            Err(FlightError::UnknownCity(city)) => assert_eq!(city, "Paris"),
            other => panic!("expected UnknownCity, got {:?}", other),
        }
        match build_options("London", "Rome", depart, None, &index()) {
            Err(FlightError::UnknownCity(city)) => assert_eq!(city, "Rome"),
            other => panic!("expected UnknownCity, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("20240229").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(matches!(parse_date("2024-01-15"), Err(FlightError::DateParseError(_))));
        assert!(parse_date("20230229").is_err());
    }
}
