//! Request handlers for the cache dump and cache listing pages.
//!
//! The HTTP transport is abstracted as a [`ResponseStream`]: the handler
//! announces the response head once, then writes the body into it.

use std::io::{self, Write};

use log::{debug, info};
use time::OffsetDateTime;

use crate::core::{Error, LogSource, Result};
use crate::export::{
    CsvWriter, ExportConfig, ExportEngine, ExportFormat, ExportSummary, JsonListingWriter,
};
use crate::schema::TaskSchema;

pub const CSV_CONTENT_TYPE: &str = "application/octet-stream";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Whether the caller holds a valid session.
pub trait Session {
    fn is_logged_in(&self) -> bool;
}

impl Session for bool {
    fn is_logged_in(&self) -> bool {
        *self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub content_type: &'static str,
    pub content_disposition: Option<String>,
}

pub trait ResponseStream: Write {
    /// Send status and headers; called once before any body bytes.
    fn start(&mut self, head: &ResponseHead) -> io::Result<()>;
}

/// Identity of the logging device, used to name the download.
#[derive(Debug, Clone, Default)]
pub struct DeviceIdentity {
    pub name: String,
    pub unit: u8,
}

/// Everything a handler needs besides the request itself.
pub struct ExportContext<'a, S: LogSource + ?Sized> {
    pub store: &'a mut S,
    pub schema: &'a dyn TaskSchema,
    pub device: &'a DeviceIdentity,
    /// Wall clock time, `None` while the device has no time source.
    pub now: Option<OffsetDateTime>,
}

/// `cachedump_<name>_U<unit>[_YYYYMMDDhhmmss].csv`
pub fn attachment_name(device: &DeviceIdentity, now: Option<OffsetDateTime>) -> String {
    let mut name = format!("cachedump_{}_U{}", device.name, device.unit);
    if let Some(now) = now {
        let date = now.date();
        name.push_str(&format!(
            "_{:04}{:02}{:02}{:02}{:02}{:02}",
            date.year(),
            date.month() as u8,
            date.day(),
            now.hour(),
            now.minute(),
            now.second()
        ));
    }
    name.push_str(".csv");
    name
}

/// Stream the whole cache log as a CSV attachment.
///
/// Refuses to run, and writes nothing, without a valid session.
pub fn handle_dump<S, R>(
    ctx: &mut ExportContext<'_, S>,
    session: &dyn Session,
    query: &str,
    response: &mut R,
) -> Result<ExportSummary>
where
    S: LogSource + ?Sized,
    R: ResponseStream,
{
    if !session.is_logged_in() {
        debug!("cache dump refused: not logged in");
        return Err(Error::Unauthenticated);
    }
    let config = ExportConfig::from_query(query, ExportFormat::Csv);
    let file_name = attachment_name(ctx.device, ctx.now);
    info!("cache dump {file_name} ({config:?})");

    let engine = ExportEngine::new(config, ctx.schema);
    let head = ResponseHead {
        status: 200,
        content_type: CSV_CONTENT_TYPE,
        content_disposition: Some(format!("attachment; filename={file_name}")),
    };
    response.start(&head)?;
    let mut writer = CsvWriter::new(&mut *response, engine.config().separator);
    engine.run(&mut *ctx.store, &mut writer)
}

/// Describe the cache: column labels, chunk files and plugin IDs.
pub fn handle_cache_json<S, R>(
    ctx: &mut ExportContext<'_, S>,
    session: &dyn Session,
    query: &str,
    response: &mut R,
) -> Result<ExportSummary>
where
    S: LogSource + ?Sized,
    R: ResponseStream,
{
    if !session.is_logged_in() {
        debug!("cache listing refused: not logged in");
        return Err(Error::Unauthenticated);
    }
    let config = ExportConfig::from_query(query, ExportFormat::Json);
    let engine = ExportEngine::new(config, ctx.schema);
    let head = ResponseHead {
        status: 200,
        content_type: JSON_CONTENT_TYPE,
        content_disposition: None,
    };
    response.start(&head)?;
    let mut writer = JsonListingWriter::new(&mut *response);
    engine.run(&mut *ctx.store, &mut writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_name_with_and_without_clock() {
        let device = DeviceIdentity {
            name: "garden".to_string(),
            unit: 3,
        };
        assert_eq!(attachment_name(&device, None), "cachedump_garden_U3.csv");
        assert_eq!(
            attachment_name(&device, OffsetDateTime::from_unix_timestamp(1_709_190_309).ok()),
            "cachedump_garden_U3_20240229070509.csv"
        );
    }
}
