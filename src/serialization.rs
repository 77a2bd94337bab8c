//! Writers for the persisted form of entities.
//!
//! Entities are written as the generic map produced by
//! [`Entity::to_json_map`]; computed attributes are not part of the output.

use std::io::Write;

use crate::entity::Entity;

/// Error type for serialization operations
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes one entity per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single entity as an NDJSON line
    pub fn write(&mut self, entity: &Entity) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut self.writer, &entity.to_json_map())?;
        writeln!(self.writer)?;
        Ok(())
    }

    pub fn write_all(&mut self, entities: &[Entity]) -> Result<(), SerializationError> {
        for entity in entities {
            self.write(entity)?;
        }
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON array writer
///
/// Streams entities into a single JSON array: the opening bracket is written
/// on construction, each entity as it arrives, the closing bracket on
/// [`finish`](Self::finish).
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    pretty: bool,
    first: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Create a compact JSON array writer and write the opening bracket
    pub fn new(writer: W) -> Result<Self, SerializationError> {
        Self::open(writer, false)
    }

    /// Create a writer that indents the array the way `serde_json` pretty-prints it
    pub fn new_pretty(writer: W) -> Result<Self, SerializationError> {
        Self::open(writer, true)
    }

    fn open(mut writer: W, pretty: bool) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            pretty,
            first: true,
        })
    }

    /// Write a single entity to the JSON array
    pub fn write(&mut self, entity: &Entity) -> Result<(), SerializationError> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        let map = entity.to_json_map();
        if self.pretty {
            // escaped JSON strings never hold a raw newline
            let json = serde_json::to_string_pretty(&map)?.replace('\n', "\n  ");
            write!(self.writer, "\n  {}", json)?;
        } else {
            serde_json::to_writer(&mut self.writer, &map)?;
        }
        Ok(())
    }

    /// Close the bracket and flush
    pub fn finish(mut self) -> Result<(), SerializationError> {
        if self.pretty && !self.first {
            writeln!(self.writer)?;
        }
        writeln!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}
