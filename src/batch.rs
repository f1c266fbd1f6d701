use bytes::Bytes;
use thiserror::Error;

/// Hard per-upload limits enforced by both the client and the backend.
pub const MAX_FILES: usize = 5;
pub const MAX_TOTAL_BYTES: u64 = 30 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("You can only upload up to {MAX_FILES} files total.")]
    TooManyFiles,
    #[error("Total upload size must not exceed 30 MB.")]
    BatchTooLarge,
    #[error("No file at index {0}")]
    IndexOutOfRange(usize),
}

/// One file selected for upload.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub name: String,
    pub byte_size: u64,
    pub content: Bytes,
    pub mime_type: String,
}

impl BatchFile {
    /// Build a batch entry from a file name and its contents. The MIME type
    /// is guessed from the name, falling back to a generic binary type.
    pub fn new(name: impl Into<String>, content: Bytes) -> Self {
        let name = name.into();
        let mime_type = mime_guess::from_path(&name)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Self {
            byte_size: content.len() as u64,
            content,
            mime_type,
            name,
        }
    }
}

/// An ordered set of files selected for a single upload transaction.
///
/// Mutated through `validate_batch` / `remove_at` until a transmission
/// starts, frozen for the duration of that transmission, cleared on success.
/// Two files with the same name are kept as distinct entries.
#[derive(Debug, Clone, Default)]
pub struct FileBatch {
    files: Vec<BatchFile>,
}

impl FileBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[BatchFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.byte_size).sum()
    }

    /// Re-check the batch invariants. Used as a defense against stale state
    /// immediately before transmission.
    pub fn check_limits(&self) -> Result<(), ValidationError> {
        if self.len() > MAX_FILES {
            return Err(ValidationError::TooManyFiles);
        }
        if self.total_size() > MAX_TOTAL_BYTES {
            return Err(ValidationError::BatchTooLarge);
        }
        Ok(())
    }
}

/// Validate adding `incoming` to `existing` and return the combined batch.
///
/// Rule order matters: the file-count bound is checked before the size
/// bound, and only the first violated rule is reported. On success the
/// result is `existing ++ incoming` with both orders preserved; `existing`
/// is left untouched on failure.
pub fn validate_batch(
    existing: &FileBatch,
    incoming: Vec<BatchFile>,
) -> Result<FileBatch, ValidationError> {
    if existing.len() + incoming.len() > MAX_FILES {
        return Err(ValidationError::TooManyFiles);
    }

    let incoming_size: u64 = incoming.iter().map(|f| f.byte_size).sum();
    if existing.total_size() + incoming_size > MAX_TOTAL_BYTES {
        return Err(ValidationError::BatchTooLarge);
    }

    let mut files = existing.files.clone();
    files.extend(incoming);
    Ok(FileBatch { files })
}

/// Remove the file at `index`, preserving the order of the remainder.
pub fn remove_at(batch: &FileBatch, index: usize) -> Result<FileBatch, ValidationError> {
    if index >= batch.len() {
        return Err(ValidationError::IndexOutOfRange(index));
    }

    let mut files = batch.files.clone();
    files.remove(index);
    Ok(FileBatch { files })
}

/// The closed set of expiry windows the backend accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpiryHours {
    H1,
    H3,
    H6,
    H12,
    #[default]
    H24,
    H48,
    H72,
    H168,
}

impl ExpiryHours {
    pub fn as_hours(self) -> u32 {
        match self {
            ExpiryHours::H1 => 1,
            ExpiryHours::H3 => 3,
            ExpiryHours::H6 => 6,
            ExpiryHours::H12 => 12,
            ExpiryHours::H24 => 24,
            ExpiryHours::H48 => 48,
            ExpiryHours::H72 => 72,
            ExpiryHours::H168 => 168,
        }
    }

    pub fn from_hours(hours: u32) -> Option<Self> {
        match hours {
            1 => Some(ExpiryHours::H1),
            3 => Some(ExpiryHours::H3),
            6 => Some(ExpiryHours::H6),
            12 => Some(ExpiryHours::H12),
            24 => Some(ExpiryHours::H24),
            48 => Some(ExpiryHours::H48),
            72 => Some(ExpiryHours::H72),
            168 => Some(ExpiryHours::H168),
            _ => None,
        }
    }
}

/// Options for one upload transaction. An immutable snapshot is taken when
/// the transmission starts.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub expiry: ExpiryHours,
    password: Option<String>,
}

impl UploadOptions {
    pub fn new(expiry: ExpiryHours, password: Option<String>) -> Self {
        let mut options = Self {
            expiry,
            password: None,
        };
        options.set_password(password);
        options
    }

    /// An empty password means "no password" -- the field is omitted from
    /// the request entirely, so the server never sees an empty string.
    pub fn set_password(&mut self, password: Option<String>) {
        self.password = password.filter(|p| !p.is_empty());
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}
