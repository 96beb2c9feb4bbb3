use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use anyhow::{anyhow, Context};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const BODY_PART: &str = "word/document.xml";
pub const BODY_NAMESPACE: &str = "word/";
/// Largest entry read into memory.
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// In-memory copy of every entry of a docx container, in archive order.
#[derive(Clone)]
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

#[derive(Clone)]
pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).context("read zip")?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let name = file.name().to_string();
            // Declared sizes come from the uploader.
            if file.size() > MAX_ENTRY_BYTES {
                return Err(anyhow!(
                    "zip entry {name} declares {} bytes (limit {MAX_ENTRY_BYTES})",
                    file.size()
                ));
            }
            let mut data = Vec::with_capacity(file.size().min(1 << 20) as usize);
            (&mut file)
                .take(MAX_ENTRY_BYTES + 1)
                .read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {name}"))?;
            if data.len() as u64 > MAX_ENTRY_BYTES {
                return Err(anyhow!("zip entry {name} exceeds {MAX_ENTRY_BYTES} bytes"));
            }
            entries.push(DocxEntry {
                name,
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn body_bytes(&self) -> anyhow::Result<&[u8]> {
        self.entry(BODY_PART)
            .map(|e| e.data.as_slice())
            .ok_or_else(|| anyhow!("missing {BODY_PART}"))
    }

    /// XML parts under `word/`, in archive order.
    pub fn body_xml_entries(&self) -> Vec<&DocxEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && is_body_xml_part(&e.name))
            .collect()
    }

    pub fn to_bytes_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<Vec<u8>> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let cursor = zout.finish().context("finish zip")?;
        Ok(cursor.into_inner())
    }
}

pub fn is_body_xml_part(name: &str) -> bool {
    name.starts_with(BODY_NAMESPACE) && name.ends_with(".xml")
}
