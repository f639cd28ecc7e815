//! Update-check descriptor (`update.xml`) generation.
//!
//! Hosts poll this document to learn where the newest package lives and which
//! version it carries. Only the single-app `gupdate` response is produced.

use crx_schema::AppId;

use crate::error::{CrxError, Result};

/// Inputs for one update descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDescriptor<'a> {
    /// Package identity advertised as `appid`.
    pub app_id: &'a AppId,
    /// URL of the `.crx` file.
    pub codebase: &'a str,
    /// Version from the manifest.
    pub version: &'a str,
}

impl<'a> UpdateDescriptor<'a> {
    /// Build a descriptor, requiring a non-empty codebase.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Configuration`] if `codebase` is `None` or blank.
    pub fn new(app_id: &'a AppId, codebase: Option<&'a str>, version: &'a str) -> Result<Self> {
        let codebase = codebase
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                CrxError::Configuration("No codebase URL provided for update.xml".to_string())
            })?;

        Ok(Self {
            app_id,
            codebase,
            version,
        })
    }

    /// Render the XML document.
    pub fn render(&self) -> String {
        format!(
            "<?xml version='1.0' encoding='UTF-8'?>\n\
             <gupdate xmlns='http://www.google.com/update2/response' protocol='2.0'>\n  \
             <app appid='{}'>\n    \
             <updatecheck codebase='{}' version='{}' />\n  \
             </app>\n\
             </gupdate>\n",
            escape_attr(self.app_id.as_str()),
            escape_attr(self.codebase),
            escape_attr(self.version),
        )
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
