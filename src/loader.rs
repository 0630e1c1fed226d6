//! CSV ingestion of the three reference tables
//!
//! Headers are trimmed and matched case-insensitively. Numbers accept a
//! decimal comma and a trailing `%`. Expected headers:
//!
//! - segments: `Class,Segment,Share,Capacity_min,Capacity_max,Range_min,Range_max`
//!   plus optional `Speed_urban,Speed_rural,Speed_highway`
//! - charging: `Class` followed by one flag column per charger label
//! - temperature: `Temp_from,Temp_to,Capacity_min,Capacity_max,Range_min,Range_max`

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::domain::{ChargerType, Span, VehicleClass};
use crate::error::LoadError;
use crate::reference::{
    ChargingCompatibility, ReferenceData, RoadSpeeds, SegmentSpec, TemperatureDeratingRow,
};

/// Header name to column index, keys lowercased
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &csv::StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();
        Self { index }
    }

    fn require(&self, name: &str) -> Result<usize, LoadError> {
        self.optional(name)
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }
}

fn reader<R: Read>(source: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(source)
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn cell<'r>(record: &'r csv::StringRecord, column: usize) -> &'r str {
    record.get(column).unwrap_or("").trim()
}

fn parse_f64(s: &str, row: usize, column: &str) -> Result<f64, LoadError> {
    let cleaned = s.trim().trim_end_matches('%').trim().replace(',', ".");
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LoadError::InvalidNumber {
            row,
            column: column.to_string(),
            value: s.to_string(),
        })
}

fn parse_class(s: &str, row: usize) -> Result<VehicleClass, LoadError> {
    s.parse().map_err(|_| LoadError::UnknownClass {
        row,
        value: s.to_string(),
    })
}

fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "x" | "yes" | "true" | "ja" | "y"
    )
}

/// Read `[min, max]` from a `<prefix>_min`/`<prefix>_max` column pair
fn span(
    record: &csv::StringRecord,
    columns: &Columns,
    prefix: &str,
    row: usize,
) -> Result<Span, LoadError> {
    let min_name = format!("{prefix}_min");
    let max_name = format!("{prefix}_max");
    let min = parse_f64(cell(record, columns.require(&min_name)?), row, &min_name)?;
    let max = parse_f64(cell(record, columns.require(&max_name)?), row, &max_name)?;
    Ok(Span::new(min, max))
}

pub fn read_segments<R: Read>(source: R, delimiter: u8) -> Result<Vec<SegmentSpec>, LoadError> {
    let mut reader = reader(source, delimiter);
    let columns = Columns::new(reader.headers()?);
    let class_col = columns.require("Class")?;
    let segment_col = columns.require("Segment")?;
    let share_col = columns.require("Share")?;
    let speed_cols = [
        columns.optional("Speed_urban"),
        columns.optional("Speed_rural"),
        columns.optional("Speed_highway"),
    ];

    let mut segments = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = row_idx + 2; // header is row 1

        let speeds = match speed_cols {
            [Some(u), Some(r), Some(h)]
                if [u, r, h].iter().all(|&c| !cell(&record, c).is_empty()) =>
            {
                Some(RoadSpeeds {
                    urban_kmh: parse_f64(cell(&record, u), row, "Speed_urban")?,
                    rural_kmh: parse_f64(cell(&record, r), row, "Speed_rural")?,
                    highway_kmh: parse_f64(cell(&record, h), row, "Speed_highway")?,
                })
            }
            _ => None,
        };

        segments.push(SegmentSpec {
            class: parse_class(cell(&record, class_col), row)?,
            segment: cell(&record, segment_col).to_string(),
            share_percent: parse_f64(cell(&record, share_col), row, "Share")?,
            capacity_kwh: span(&record, &columns, "capacity", row)?,
            range_km: span(&record, &columns, "range", row)?,
            speeds,
        });
    }

    debug!(rows = segments.len(), "segment table read");
    Ok(segments)
}

pub fn read_compatibility<R: Read>(
    source: R,
    delimiter: u8,
) -> Result<Vec<ChargingCompatibility>, LoadError> {
    let mut reader = reader(source, delimiter);
    let headers = reader.headers()?.clone();
    let class_col = Columns::new(&headers).require("Class")?;

    let chargers = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != class_col && !h.trim().is_empty())
        .map(|(i, h)| h.parse::<ChargerType>().map(|charger| (i, charger)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = row_idx + 2;
        rows.push(ChargingCompatibility {
            class: parse_class(cell(&record, class_col), row)?,
            chargers: chargers
                .iter()
                .filter(|(i, _)| parse_flag(cell(&record, *i)))
                .map(|(_, charger)| charger.clone())
                .collect(),
        });
    }

    debug!(rows = rows.len(), chargers = chargers.len(), "charging table read");
    Ok(rows)
}

pub fn read_temperature<R: Read>(
    source: R,
    delimiter: u8,
) -> Result<Vec<TemperatureDeratingRow>, LoadError> {
    let mut reader = reader(source, delimiter);
    let columns = Columns::new(reader.headers()?);
    let from_col = columns.require("Temp_from")?;
    let to_col = columns.require("Temp_to")?;

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = row_idx + 2;
        rows.push(TemperatureDeratingRow {
            temp_from_c: parse_f64(cell(&record, from_col), row, "Temp_from")?,
            temp_to_c: parse_f64(cell(&record, to_col), row, "Temp_to")?,
            capacity_percent: span(&record, &columns, "capacity", row)?,
            range_percent: span(&record, &columns, "range", row)?,
        });
    }

    debug!(rows = rows.len(), "temperature table read");
    Ok(rows)
}

/// Load and validate all three tables
pub fn load_reference_data(
    segments: &Path,
    charging: &Path,
    temperature: &Path,
    delimiter: u8,
) -> Result<ReferenceData, LoadError> {
    let data = ReferenceData::new(
        read_segments(open(segments)?, delimiter)?,
        read_compatibility(open(charging)?, delimiter)?,
        read_temperature(open(temperature)?, delimiter)?,
    )?;

    info!(
        segments = data.segments().len(),
        bounds_min_c = data.temperature_bounds().min,
        bounds_max_c = data.temperature_bounds().max,
        "reference data loaded"
    );
    Ok(data)
}
