//! Enpass keyfile loading.
//!
//! A keyfile is a tiny XML document whose only text content is a hex string,
//! e.g. `<?xml version="1.0" encoding="UTF-8"?><key>6b6579...</key>`. The
//! decoded bytes become part of the master secret.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Read and decode the keyfile at `path`.
///
/// # Errors
///
/// Returns [`VaultError::KeyfileUnreadable`] if the file cannot be read and
/// [`VaultError::KeyfileMalformed`] if it is not XML with a hex payload.
pub fn load(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    let xml = std::fs::read_to_string(path)
        .map(Zeroizing::new)
        .map_err(|source| VaultError::KeyfileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

    let key = parse(&xml)?;
    tracing::debug!(path = %path.display(), key_len = key.len(), "loaded keyfile");
    Ok(key)
}

/// Extract and hex-decode the text payload of a keyfile document.
pub fn parse(xml: &str) -> Result<Zeroizing<Vec<u8>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_element = false;
    let mut payload = Zeroizing::new(String::new());

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) => saw_element = true,
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| malformed(e.to_string()))?;
                payload.push_str(text.trim());
            }
            Ok(Event::CData(data)) => {
                let data = std::str::from_utf8(&data)
                    .map_err(|e| malformed(format!("CDATA is not UTF-8: {e}")))?;
                payload.push_str(data.trim());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(malformed(format!(
                    "invalid XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    if !saw_element {
        return Err(malformed("no XML element found"));
    }
    if payload.is_empty() {
        return Err(malformed("keyfile has no key payload"));
    }

    hex::decode(payload.as_bytes())
        .map(Zeroizing::new)
        .map_err(|e| malformed(format!("key payload is not hex: {e}")))
}

fn malformed(reason: impl Into<String>) -> VaultError {
    VaultError::KeyfileMalformed {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
