use crate::error::Result;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Caller-owned, ordered set of named output blobs for one conversion run.
///
/// Writing a name that already exists replaces its bytes but keeps its
/// original position.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutputBuffer {
    entries: Vec<(String, Vec<u8>)>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = bytes,
            None => self.entries.push((name, bytes)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, b)| (n.as_str(), b.as_slice()))
    }
}

#[cfg(test)]
impl OutputBuffer {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

/// Packs every entry into a deflated ZIP, flat, in buffer order.
///
/// Timestamps are pinned to the ZIP epoch so equal input gives equal bytes.
pub fn package_archive(buffer: &OutputBuffer) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    for (name, bytes) in buffer.iter() {
        debug!("Adding {} ({} bytes) to archive", name, bytes.len());
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn buffer() -> OutputBuffer {
        let mut buffer = OutputBuffer::new();
        buffer.insert("b.svg", b"<svg/>".to_vec());
        buffer.insert("a.svg", b"<svg></svg>".to_vec());
        buffer
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut buffer = buffer();
        buffer.insert("b.svg", b"new".to_vec());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.names().collect::<Vec<_>>(), vec!["b.svg", "a.svg"]);
        assert_eq!(buffer.get("b.svg"), Some(&b"new"[..]));
    }

    #[test]
    fn test_archive_entries_in_order() {
        let bytes = package_archive(&buffer()).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(0).unwrap().name(), "b.svg");
        assert_eq!(archive.by_index(1).unwrap().name(), "a.svg");

        let mut content = String::new();
        archive
            .by_name("a.svg")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "<svg></svg>");
    }

    #[test]
    fn test_archive_is_deterministic() {
        assert_eq!(
            package_archive(&buffer()).unwrap(),
            package_archive(&buffer()).unwrap()
        );
    }

    #[test]
    fn test_empty_buffer_gives_empty_archive() {
        let bytes = package_archive(&OutputBuffer::new()).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
