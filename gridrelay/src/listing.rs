//! Listing metadata carried in stored filenames.
//!
//! Uploaders encode a phone listing into the GridFS filename as
//! `<brand>_<web id>?<phone number>?<description>?<complications>`. There is no escaping: a
//! value containing `_` or `?` shifts every later field.

use crate::errors::{Error, Result};

const BRAND_SEPARATOR: char = '_';
const FIELD_SEPARATOR: char = '?';

/// Fields decoded from a listing filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingMetadata {
    pub brand: String,
    pub web_id: String,
    pub phone_number: String,
    pub description: String,
    pub complications: String,
}

impl ListingMetadata {
    /// Decode listing fields from a filename.
    ///
    /// Only the first two `_` segments and the first four `?` segments of the second one are
    /// read, so a relay suffix such as `_<hex id>.jpg` appended after the complications is
    /// ignored. Fewer segments than that is a [`Error::MetadataFormat`]. Values are not
    /// validated beyond splitting.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let mut parts = filename.split(BRAND_SEPARATOR);
        let brand = parts.next().unwrap_or_default();
        let details = parts
            .next()
            .ok_or_else(|| format_error(filename, format!("missing '{BRAND_SEPARATOR}' separator")))?;

        let fields: Vec<&str> = details.split(FIELD_SEPARATOR).take(4).collect();
        let &[web_id, phone_number, description, complications] = fields.as_slice() else {
            return Err(format_error(
                filename,
                format!(
                    "expected 4 '{FIELD_SEPARATOR}'-separated fields after the brand, found {}",
                    fields.len()
                ),
            ));
        };

        Ok(Self {
            brand: brand.to_string(),
            web_id: web_id.to_string(),
            phone_number: phone_number.to_string(),
            description: description.to_string(),
            complications: complications.to_string(),
        })
    }

    /// Chat message announcing the listing.
    pub fn message_text(&self) -> String {
        format!(
            "Марка: {}\nWeb ID: {}\nНомер телефона: {}\nОписание: {}\nКомплектация: {}",
            self.brand, self.web_id, self.phone_number, self.description, self.complications
        )
    }
}

fn format_error(filename: &str, reason: String) -> Error {
    Error::MetadataFormat {
        filename: filename.to_string(),
        reason,
    }
}
