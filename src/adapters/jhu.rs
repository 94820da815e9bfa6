//! Adapter for JHU CSSE style time-series CSV files
//!
//! Identifier columns are matched by name; every other header is a date.

use super::{finite_cell, WideRow, WideTable, WideTableAdapter};
use crate::error::ComputeError;
use crate::types::Metric;
use chrono::NaiveDate;

/// Default date header format (`1/22/20`)
pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%y";

const SUB_REGION_HEADERS: &[&str] = &["Province/State", "Province_State"];
const REGION_HEADERS: &[&str] = &["Country/Region", "Country_Region"];
const LATITUDE_HEADERS: &[&str] = &["Lat"];
const LONGITUDE_HEADERS: &[&str] = &["Long", "Long_"];

/// CSV adapter for wide cumulative tables
#[derive(Debug, Clone)]
pub struct JhuCsvAdapter {
    date_format: String,
}

impl Default for JhuCsvAdapter {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl JhuCsvAdapter {
    /// Adapter for files whose date headers use another `chrono` format
    pub fn with_date_format(date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
        }
    }
}

#[derive(Default)]
struct ColumnLayout {
    region: Option<usize>,
    sub_region: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    dates: Vec<(usize, NaiveDate)>,
}

impl WideTableAdapter for JhuCsvAdapter {
    fn parse(&self, raw: &str, metric: Metric) -> Result<WideTable, ComputeError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.is_empty() {
            return Err(ComputeError::ParseError(format!(
                "{metric} table contains no header row"
            )));
        }

        let layout = self.layout(&headers)?;
        let region_col = layout
            .region
            .ok_or_else(|| ComputeError::MissingColumn(REGION_HEADERS[0].to_string()))?;

        let mut table = WideTable::new(metric, layout.dates.iter().map(|(_, d)| *d).collect());

        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            // Header is line 1
            let line = row_idx + 2;

            let region = record.get(region_col).unwrap_or("").trim();
            if region.is_empty() {
                return Err(ComputeError::ParseError(format!(
                    "{metric} table line {line}: empty region"
                )));
            }

            let sub_region = layout
                .sub_region
                .and_then(|col| record.get(col))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            let latitude = match layout.latitude {
                Some(col) => parse_cell(record.get(col), metric, line, &headers[col])?,
                None => None,
            };
            let longitude = match layout.longitude {
                Some(col) => parse_cell(record.get(col), metric, line, &headers[col])?,
                None => None,
            };

            let values = layout
                .dates
                .iter()
                .map(|(col, _)| parse_cell(record.get(*col), metric, line, &headers[*col]))
                .collect::<Result<Vec<_>, _>>()?;

            table.push_row(WideRow {
                region: region.to_string(),
                sub_region,
                latitude,
                longitude,
                values,
            })?;
        }

        log::debug!(
            "parsed {} table: {} rows x {} dates",
            metric,
            table.rows.len(),
            table.dates.len()
        );

        Ok(table)
    }
}

impl JhuCsvAdapter {
    fn layout(&self, headers: &[String]) -> Result<ColumnLayout, ComputeError> {
        let mut layout = ColumnLayout::default();

        for (col, header) in headers.iter().enumerate() {
            let name = header.as_str();
            if REGION_HEADERS.contains(&name) {
                layout.region = Some(col);
            } else if SUB_REGION_HEADERS.contains(&name) {
                layout.sub_region = Some(col);
            } else if LATITUDE_HEADERS.contains(&name) {
                layout.latitude = Some(col);
            } else if LONGITUDE_HEADERS.contains(&name) {
                layout.longitude = Some(col);
            } else {
                let date = NaiveDate::parse_from_str(name, &self.date_format).map_err(|e| {
                    ComputeError::DateParseError(format!(
                        "column {} header {:?} is neither an identifier nor a {} date: {}",
                        col + 1,
                        name,
                        self.date_format,
                        e
                    ))
                })?;
                layout.dates.push((col, date));
            }
        }

        Ok(layout)
    }
}

/// Parse an optional numeric cell; blank and NaN cells are missing
fn parse_cell(
    cell: Option<&str>,
    metric: Metric,
    line: usize,
    header: &str,
) -> Result<Option<f64>, ComputeError> {
    let cell = match cell.map(str::trim) {
        Some(c) if !c.is_empty() => c,
        _ => return Ok(None),
    };

    let value: f64 = cell.parse().map_err(|_| {
        ComputeError::ParseError(format!(
            "{metric} table line {line}, column {header:?}: invalid number {cell:?}"
        ))
    })?;

    finite_cell(Some(value)).map_err(|_| {
        ComputeError::ParseError(format!(
            "{metric} table line {line}, column {header:?}: non-finite value"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_confirmed_csv() -> &'static str {
        "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20,1/24/20\n\
         ,Italy,41.87,12.56,0,2,3\n\
         Hubei,China,30.97,112.27,444,444,549\n\
         Ontario,Canada,,,1,,3\n"
    }

    #[test]
    fn test_parse_wide_csv() {
        let table = JhuCsvAdapter::default()
            .parse(sample_confirmed_csv(), Metric::Confirmed)
            .unwrap();

        assert_eq!(table.metric, Metric::Confirmed);
        assert_eq!(table.dates.len(), 3);
        assert_eq!(table.dates[0], NaiveDate::from_ymd_opt(2020, 1, 22).unwrap());
        assert_eq!(table.rows.len(), 3);

        let italy = &table.rows[0];
        assert_eq!(italy.region, "Italy");
        assert_eq!(italy.sub_region, None);
        assert_eq!(italy.values, vec![Some(0.0), Some(2.0), Some(3.0)]);

        let hubei = &table.rows[1];
        assert_eq!(hubei.sub_region.as_deref(), Some("Hubei"));
        assert_eq!(hubei.latitude, Some(30.97));
    }

    #[test]
    fn test_blank_cells_are_missing() {
        let table = JhuCsvAdapter::default()
            .parse(sample_confirmed_csv(), Metric::Confirmed)
            .unwrap();

        let ontario = &table.rows[2];
        assert_eq!(ontario.latitude, None);
        assert_eq!(ontario.longitude, None);
        assert_eq!(ontario.values, vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn test_alias_headers_and_iso_dates() {
        let csv = "Province_State,Country_Region,Lat,Long_,2020-03-01,2020-03-02\n\
                   ,Chile,-35.6,-71.5,1,5\n";

        let table = JhuCsvAdapter::with_date_format("%Y-%m-%d")
            .parse(csv, Metric::Deaths)
            .unwrap();

        assert_eq!(table.rows[0].region, "Chile");
        assert_eq!(table.rows[0].longitude, Some(-71.5));
        assert_eq!(table.dates[1], NaiveDate::from_ymd_opt(2020, 3, 2).unwrap());
    }

    #[test]
    fn test_missing_region_column() {
        let csv = "Province/State,Lat,Long,1/22/20\nX,1,2,3\n";
        let result = JhuCsvAdapter::default().parse(csv, Metric::Confirmed);
        assert!(matches!(result, Err(ComputeError::MissingColumn(_))));
    }

    #[test]
    fn test_bad_date_header() {
        let csv = "Country/Region,Population,1/22/20\nItaly,60000000,3\n";
        let result = JhuCsvAdapter::default().parse(csv, Metric::Confirmed);
        assert!(matches!(result, Err(ComputeError::DateParseError(_))));
    }

    #[test]
    fn test_invalid_number() {
        let csv = "Country/Region,1/22/20\nItaly,many\n";
        let result = JhuCsvAdapter::default().parse(csv, Metric::Confirmed);
        match result {
            Err(ComputeError::ParseError(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
