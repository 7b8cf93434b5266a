//! Turning uploaded files into conversation content.
//!
//! Images are decoded and kept as image turns, tabular files (CSV and
//! spreadsheets) are parsed and rendered as a short fixed-width preview,
//! and anything else is just described by name and type.

mod table;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::ImageFormat;
use mime::Mime;

use crate::conversation::{ImageContent, TurnContent};
use table::Table;

/// The number of data rows included in a table preview.
pub const PREVIEW_ROWS: usize = 10;

const SPREADSHEET_MIME_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel.sheet.macroenabled.12",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.ms-excel",
];

/// A file uploaded by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    name: String,
    mime: Mime,
    bytes: Bytes,
}

impl UploadedFile {
    /// Creates a file with its name, declared MIME type and contents.
    #[inline]
    pub fn new<S: Into<String>>(name: S, mime: Mime, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            mime,
            bytes,
        }
    }

    /// Returns the file name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared MIME type.
    #[inline]
    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// Returns the file contents.
    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Returns a value that identifies this file, used to tell whether the
    /// same file has been submitted again.
    pub fn fingerprint(&self) -> FileFingerprint {
        let mut hasher = DefaultHasher::new();
        self.bytes.hash(&mut hasher);
        FileFingerprint {
            name: self.name.clone(),
            len: self.bytes.len(),
            digest: hasher.finish(),
        }
    }

    fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Identifies the contents of an [`UploadedFile`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileFingerprint {
    name: String,
    len: usize,
    digest: u64,
}

/// How an uploaded file is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Decoded and sent as an image.
    Image,
    /// Parsed as delimited text.
    Csv,
    /// Parsed as an Excel or OpenDocument workbook.
    Spreadsheet,
    /// Only described by name and type.
    Other,
}

impl FileKind {
    /// Classifies a file.
    ///
    /// A known extension wins over the declared MIME type, since browsers
    /// commonly declare CSV files as `application/vnd.ms-excel`.
    pub fn of(file: &UploadedFile) -> Self {
        let by_extension = match file.extension().as_deref() {
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp") => {
                Some(FileKind::Image)
            }
            Some("csv") => Some(FileKind::Csv),
            Some("xlsx" | "xlsm" | "xls" | "ods") => Some(FileKind::Spreadsheet),
            _ => None,
        };
        if let Some(kind) = by_extension {
            return kind;
        }

        let mime = file.mime();
        let essence = mime.essence_str().to_ascii_lowercase();
        if mime.type_() == mime::IMAGE {
            FileKind::Image
        } else if essence == "text/csv" {
            FileKind::Csv
        } else if SPREADSHEET_MIME_TYPES.contains(&essence.as_str()) {
            FileKind::Spreadsheet
        } else {
            FileKind::Other
        }
    }
}

/// An error that occurred while decoding an uploaded file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestError {
    file_name: String,
    kind: FileKind,
    reason: String,
}

impl IngestError {
    fn new(file: &UploadedFile, kind: FileKind, reason: String) -> Self {
        Self {
            file_name: file.name.clone(),
            kind,
            reason,
        }
    }

    /// Returns the name of the file that failed.
    #[inline]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns how the file was being handled when it failed.
    #[inline]
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Returns the underlying reason.
    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            FileKind::Image => "an image",
            FileKind::Csv => "CSV",
            FileKind::Spreadsheet => "a spreadsheet",
            FileKind::Other => "a file",
        };
        write!(
            f,
            "could not read `{}` as {what}: {}",
            self.file_name, self.reason
        )
    }
}

impl StdError for IngestError {}

/// Converts an uploaded file into user turn contents, in order.
pub fn ingest(file: &UploadedFile) -> Result<Vec<TurnContent>, IngestError> {
    let kind = FileKind::of(file);
    debug!(name = file.name(), ?kind, size = file.bytes.len(), "ingesting file");

    match kind {
        FileKind::Image => {
            let image = decode_image(file)
                .map_err(|reason| IngestError::new(file, kind, reason))?;
            let caption = format!(
                "Uploaded image: {} ({}x{})",
                file.name, image.width, image.height
            );
            Ok(vec![TurnContent::Text(caption), TurnContent::Image(image)])
        }
        FileKind::Csv | FileKind::Spreadsheet => {
            let table = if kind == FileKind::Csv {
                Table::from_csv(&file.bytes)
            } else {
                Table::from_spreadsheet(&file.bytes)
            }
            .map_err(|reason| IngestError::new(file, kind, reason))?;
            Ok(vec![TurnContent::Text(describe_table(&file.name, &table))])
        }
        FileKind::Other => Ok(vec![TurnContent::Text(format!(
            "Uploaded file: {} (type: {}, {} bytes)",
            file.name,
            file.mime.essence_str(),
            file.bytes.len()
        ))]),
    }
}

fn describe_table(name: &str, table: &Table) -> String {
    let total = table.rows.len();
    let mut text = format!(
        "Uploaded file: {name} ({total} rows x {} columns)\n",
        table.column_count()
    );
    match total {
        0 => text.push_str("The table has a header but no data rows:\n"),
        n if n <= PREVIEW_ROWS => {
            text.push_str(&format!("Preview of all {n} rows:\n"))
        }
        _ => text.push_str(&format!(
            "Preview of the first {PREVIEW_ROWS} rows:\n"
        )),
    }
    text.push_str(&table.render_preview(PREVIEW_ROWS));
    text
}

fn decode_image(file: &UploadedFile) -> Result<ImageContent, String> {
    let format =
        image::guess_format(&file.bytes).map_err(|err| format!("{err}"))?;
    let decoded = image::load_from_memory_with_format(&file.bytes, format)
        .map_err(|err| format!("{err}"))?;

    // The model only accepts a few formats inline, others are re-encoded.
    let (mime, data) = match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP => {
            let mime = format
                .to_mime_type()
                .parse()
                .unwrap_or_else(|_| file.mime.clone());
            (mime, file.bytes.clone())
        }
        _ => {
            trace!(?format, "re-encoding image as png");
            let mut buf = Cursor::new(Vec::new());
            decoded
                .write_to(&mut buf, ImageFormat::Png)
                .map_err(|err| format!("{err}"))?;
            (mime::IMAGE_PNG, Bytes::from(buf.into_inner()))
        }
    };

    Ok(ImageContent {
        name: file.name.clone(),
        mime,
        data,
        width: decoded.width(),
        height: decoded.height(),
    })
}
