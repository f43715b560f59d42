//! Output side of an export: CSV table or JSON listing.
//!
//! Writers push bytes out as soon as they have them. Once the downstream
//! transport fails, a writer marks itself abandoned and answers every later
//! call with [`Error::SinkClosed`]; the engine stops the pass on that signal.

use std::io::Write;

use log::warn;
use serde::Serialize;

use crate::core::{Error, Result};
use crate::export::options::Separator;

pub trait StreamingWriter {
    fn write_header_columns(&mut self, labels: &[String]) -> Result<()>;

    fn write_row(&mut self, cells: &[String]) -> Result<()>;

    /// Chunk file names, for listing formats.
    fn write_files(&mut self, _names: &[String]) -> Result<()> {
        Ok(())
    }

    /// Plugin ID per task slot, for listing formats.
    fn write_plugin_ids(&mut self, _ids: &[u16]) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()>;
}

/// Separator-delimited table, one CRLF-terminated line per row.
pub struct CsvWriter<W: Write> {
    writer: csv::Writer<W>,
    abandoned: bool,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W, separator: Separator) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(separator.as_byte())
            .terminator(csv::Terminator::CRLF)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(out);
        Self {
            writer,
            abandoned: false,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Recover the underlying output, flushing what is buffered.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| Error::Io(std::io::Error::new(err.error().kind(), err.error().to_string())))
    }

    fn record(&mut self, fields: &[String]) -> Result<()> {
        if self.abandoned {
            return Err(Error::SinkClosed);
        }
        match self.writer.write_record(fields) {
            Ok(()) => Ok(()),
            Err(err) => match err.into_kind() {
                csv::ErrorKind::UnequalLengths { .. } => {
                    Err(Error::Corrupt("row width differs from header"))
                }
                kind => Err(self.abandon(&format!("{kind:?}"))),
            },
        }
    }

    fn abandon(&mut self, reason: &str) -> Error {
        warn!("csv output abandoned: {reason}");
        self.abandoned = true;
        Error::SinkClosed
    }
}

impl<W: Write> StreamingWriter for CsvWriter<W> {
    fn write_header_columns(&mut self, labels: &[String]) -> Result<()> {
        self.record(labels)
    }

    fn write_row(&mut self, cells: &[String]) -> Result<()> {
        self.record(cells)
    }

    fn finish(&mut self) -> Result<()> {
        if self.abandoned {
            return Err(Error::SinkClosed);
        }
        match self.writer.flush() {
            Ok(()) => Ok(()),
            Err(err) => Err(self.abandon(&err.to_string())),
        }
    }
}

#[derive(Serialize)]
struct CacheListing<'a> {
    columns: &'a [String],
    files: &'a [String],
    #[serde(rename = "pluginID")]
    plugin_ids: &'a [u16],
    separator: &'a str,
    nrfiles: usize,
}

/// Single JSON object describing the cache; data rows are not emitted.
pub struct JsonListingWriter<W: Write> {
    out: W,
    columns: Vec<String>,
    files: Vec<String>,
    plugin_ids: Vec<u16>,
    abandoned: bool,
}

impl<W: Write> JsonListingWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            columns: Vec::new(),
            files: Vec::new(),
            plugin_ids: Vec::new(),
            abandoned: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self) -> std::io::Result<()> {
        let listing = CacheListing {
            columns: &self.columns,
            files: &self.files,
            plugin_ids: &self.plugin_ids,
            // Labels are always produced with ';' semantics.
            separator: ";",
            nrfiles: self.files.len(),
        };
        serde_json::to_writer(&mut self.out, &listing)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl<W: Write> StreamingWriter for JsonListingWriter<W> {
    fn write_header_columns(&mut self, labels: &[String]) -> Result<()> {
        self.columns = labels.to_vec();
        Ok(())
    }

    fn write_row(&mut self, _cells: &[String]) -> Result<()> {
        Ok(())
    }

    fn write_files(&mut self, names: &[String]) -> Result<()> {
        self.files = names.to_vec();
        Ok(())
    }

    fn write_plugin_ids(&mut self, ids: &[u16]) -> Result<()> {
        self.plugin_ids = ids.to_vec();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.abandoned {
            return Err(Error::SinkClosed);
        }
        if let Err(err) = self.emit() {
            warn!("json output abandoned: {err}");
            self.abandoned = true;
            return Err(Error::SinkClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn csv_rows_end_with_crlf() {
        let mut writer = CsvWriter::new(Vec::new(), Separator::TAB);
        writer
            .write_header_columns(&strings(&["UNIX timestamp", "UTC timestamp"]))
            .unwrap();
        writer.write_row(&strings(&["100", "1970-01-01 00:01:40"])).unwrap();
        writer.finish().unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "UNIX timestamp\tUTC timestamp\r\n100\t1970-01-01 00:01:40\r\n"
        );
    }

    #[test]
    fn csv_rejects_ragged_rows() {
        let mut writer = CsvWriter::new(Vec::new(), Separator::SEMICOLON);
        writer.write_header_columns(&strings(&["a", "b"])).unwrap();
        assert!(matches!(
            writer.write_row(&strings(&["1"])),
            Err(Error::Corrupt(_))
        ));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
        }
    }

    #[test]
    fn closed_transport_abandons_csv() {
        let mut writer = CsvWriter::new(ClosedPipe, Separator::SEMICOLON);
        // Small rows sit in the csv buffer until flushed.
        writer.write_header_columns(&strings(&["a"])).unwrap();
        assert!(matches!(writer.finish(), Err(Error::SinkClosed)));
        assert!(writer.is_abandoned());
        assert!(matches!(
            writer.write_row(&strings(&["1"])),
            Err(Error::SinkClosed)
        ));
    }

    #[test]
    fn json_listing_key_order() {
        let mut writer = JsonListingWriter::new(Vec::new());
        writer.write_header_columns(&strings(&["UNIX timestamp"])).unwrap();
        writer.write_row(&strings(&["ignored"])).unwrap();
        writer.write_files(&strings(&["cache_0.bin"])).unwrap();
        writer.write_plugin_ids(&[1, 0]).unwrap();
        writer.finish().unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            out,
            "{\"columns\":[\"UNIX timestamp\"],\"files\":[\"cache_0.bin\"],\
             \"pluginID\":[1,0],\"separator\":\";\",\"nrfiles\":1}\n"
        );
    }

    #[test]
    fn closed_transport_abandons_json() {
        let mut writer = JsonListingWriter::new(ClosedPipe);
        assert!(matches!(writer.finish(), Err(Error::SinkClosed)));
    }
}
