//! `UserApps` protobuf message stored as the cache value
//!
//! ```proto
//! message UserApps {
//!     repeated uint32 apps = 1;
//!     required double lat = 2;
//!     required double lon = 3;
//! }
//! ```

use prost::Message;

use crate::record::Record;

#[derive(Clone, PartialEq, Message)]
pub struct UserApps {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub apps: Vec<u32>,
    #[prost(double, required, tag = "2")]
    pub lat: f64,
    #[prost(double, required, tag = "3")]
    pub lon: f64,
}

impl From<&Record> for UserApps {
    fn from(record: &Record) -> Self {
        Self {
            apps: record.apps.clone(),
            lat: record.lat,
            lon: record.lon,
        }
    }
}

impl UserApps {
    /// Wire bytes for the cache value.
    pub fn to_bytes(&self) -> Result<Vec<u8>, prost::EncodeError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Single-line text form for dry-run logging.
    ///
    /// This is the `Debug` rendering, not protobuf text format.
    pub fn to_text(&self) -> String {
        format!("{self:?}")
    }
}
