use crate::error::{ConvertError, Result};
use crate::kml::{parse_document, ParserOptions};
use crate::types::ParsedDocument;
use std::fs;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use zip::ZipArchive;

const MY_MAPS_KML_ENDPOINT: &str = "https://www.google.com/maps/d/kml";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Where the KML or KMZ bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Url(String),
}

impl Source {
    /// `http(s)://` references are URLs; a Google My Maps link is rewritten to
    /// its KML export endpoint. Anything else is a local path.
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        if reference.starts_with("http://") || reference.starts_with("https://") {
            match my_maps_id(reference) {
                Some(id) => Source::Url(format!("{MY_MAPS_KML_ENDPOINT}?mid={id}")),
                None => Source::Url(reference.to_string()),
            }
        } else {
            Source::Path(PathBuf::from(reference))
        }
    }
}

/// The map id carried by a `mid=` query parameter, if any.
pub fn my_maps_id(url: &str) -> Option<&str> {
    let start = url.find("mid=")? + "mid=".len();
    let id = url[start..].split('&').next()?;
    (!id.is_empty()).then_some(id)
}

/// Retrieves raw bytes from a remote location.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConvertError::Fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ConvertError::Fetch(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ConvertError::Fetch(format!(
                "HTTP {} from {} (is the map public?)",
                response.status(),
                url
            )));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ConvertError::Fetch(format!("Failed to read response: {e}")))
    }
}

pub fn load_bytes(source: &Source, fetcher: &dyn Fetcher) -> Result<Vec<u8>> {
    match source {
        Source::Path(path) => {
            info!("Reading {:?}", path);
            Ok(fs::read(path)?)
        }
        Source::Url(url) => {
            info!("Fetching {}", url);
            fetcher.fetch(url)
        }
    }
}

/// Returns the KML text, unpacking it first if `bytes` is a KMZ container.
pub fn unpack_document(bytes: Vec<u8>) -> Result<String> {
    let bytes = if bytes.starts_with(ZIP_MAGIC) {
        extract_kml(bytes)?
    } else {
        bytes
    };
    String::from_utf8(bytes).map_err(|e| ConvertError::Parse(format!("document is not UTF-8: {e}")))
}

/// The first `.kml` entry in archive order.
fn extract_kml(bytes: Vec<u8>) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ConvertError::Container(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ConvertError::Container(e.to_string()))?;
        if entry.name().ends_with(".kml") {
            info!("Using {} from container", entry.name());
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(content);
        }
    }

    Err(ConvertError::Container("no .kml entry in archive".to_string()))
}

/// Load, unpack and parse in one go.
pub fn load_document(source: &Source, fetcher: &dyn Fetcher, options: &ParserOptions) -> Result<ParsedDocument> {
    let bytes = load_bytes(source, fetcher)?;
    let text = unpack_document(bytes)?;
    parse_document(&text, options)
}
