//! Message table for rendering errors at the UI boundary.
//!
//! The store only raises typed errors; turning them into text happens here by
//! looking up the error's message key and substituting its positional
//! parameters (`{0}`, `{1}`, ...).

use std::collections::HashMap;

use crate::error::{Error, ErrorKind};

/// Localized message templates keyed by message key.
#[derive(Debug, Clone)]
pub struct MessageTable {
    templates: HashMap<&'static str, String>,
}

impl MessageTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// The built-in English table.
    pub fn english() -> Self {
        let mut table = Self::new();
        table.insert(
            ErrorKind::DestinationUnknown,
            "Unable to write to an undisclosed destination",
        );
        table.insert(ErrorKind::Io, "Unable to access binary file {0}: {1}");
        table.insert(ErrorKind::Stream, "Unable to access binary data: {0}");
        table.insert(ErrorKind::Delete, "Unable to delete temporary file {0}: {1}");
        table.insert(ErrorKind::Crypto, "Attachment could not be decrypted: {0}");
        table.insert(ErrorKind::Encoding, "Attachment data is corrupted: {0}");
        table.insert(ErrorKind::InvalidInput, "Invalid setting: {0}");
        table.insert(ErrorKind::Background, "Attachment operation interrupted: {0}");
        table
    }

    /// Set the template for `kind`.
    pub fn insert(&mut self, kind: ErrorKind, template: impl Into<String>) {
        self.templates.insert(kind.message_key(), template.into());
    }

    /// Render `error` with this table.
    ///
    /// Falls back to the error's `Display` text when no template exists.
    pub fn render(&self, error: &Error) -> String {
        match self.templates.get(error.message_key()) {
            Some(template) => format_template(template, &error.params()),
            None => error.to_string(),
        }
    }
}

impl Default for MessageTable {
    fn default() -> Self {
        Self::english()
    }
}

/// Render `error` with the built-in English table.
pub fn render(error: &Error) -> String {
    MessageTable::english().render(error)
}

fn format_template(template: &str, params: &[String]) -> String {
    let mut text = template.to_string();
    for (i, param) in params.iter().enumerate() {
        text = text.replace(&format!("{{{}}}", i), param);
    }
    text
}
