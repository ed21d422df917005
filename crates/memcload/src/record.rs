//! Parsing of app-install log lines
//!
//! Line format: `type \t id \t lat \t lon \t app1,app2,...`

use thiserror::Error;

/// One parsed app-install line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// Device category, e.g. `idfa`. Kept verbatim.
    pub device_type: String,
    /// Device identifier. Kept verbatim, may be empty.
    pub device_id: String,
    pub lat: f64,
    pub lon: f64,
    /// Installed app ids in line order
    pub apps: Vec<u32>,
}

impl Record {
    /// Cache key `"{type}:{id}"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.device_type, self.device_id)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("invalid line: expected 5 tab-separated fields, got {0}")]
    InvalidLineFormat(usize),
    #[error("invalid `{field}` coordinate: {value:?}")]
    InvalidCoordinate { field: &'static str, value: String },
}

/// Parse one log line (without its line terminator).
pub fn parse_record(line: &str) -> Result<Record, ParseError> {
    let fields: Vec<&str> = line.split('\t').collect();
    let &[device_type, device_id, lat, lon, apps] = fields.as_slice() else {
        return Err(ParseError::InvalidLineFormat(fields.len()));
    };

    Ok(Record {
        device_type: device_type.to_string(),
        device_id: device_id.to_string(),
        lat: parse_coordinate("lat", lat)?,
        lon: parse_coordinate("lon", lon)?,
        apps: parse_apps(apps),
    })
}

/// Decimal float. Values that overflow to infinity are rejected unless the
/// token spells `inf`/`infinity`/`nan` outright.
fn parse_coordinate(field: &'static str, value: &str) -> Result<f64, ParseError> {
    let invalid = || ParseError::InvalidCoordinate {
        field,
        value: value.to_string(),
    };
    let parsed: f64 = value.parse().map_err(|_| invalid())?;
    if !parsed.is_finite() && !is_special_float(value) {
        return Err(invalid());
    }
    Ok(parsed)
}

fn is_special_float(token: &str) -> bool {
    let unsigned = token.strip_prefix(['+', '-']).unwrap_or(token);
    ["inf", "infinity", "nan"]
        .iter()
        .any(|word| unsigned.eq_ignore_ascii_case(word))
}

/// Comma-separated app ids; tokens that are not plain decimal u32 are dropped.
fn parse_apps(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter(|token| !token.starts_with('+'))
        .filter_map(|token| token.parse().ok())
        .collect()
}
