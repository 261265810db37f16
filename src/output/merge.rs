//! Splicing a generated `action-array` into a framework descriptor

use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::ops::Range;

use crate::{Error, Result};

const ACTION_ARRAY: &[u8] = b"action-array";

/// Replace the first `action-array` element of `descriptor` with `action_array`.
///
/// The whole descriptor is read first, so malformed XML or a missing
/// `action-array` is reported before anything is replaced. Text outside the
/// replaced element is kept byte for byte.
pub fn merge_action_array(descriptor: &str, action_array: &str) -> Result<String> {
    let range = locate_action_array(descriptor)?;
    debug!(
        "replacing action-array at bytes {}..{} of the descriptor",
        range.start, range.end
    );

    let mut merged = String::with_capacity(descriptor.len() - range.len() + action_array.len());
    merged.push_str(&descriptor[..range.start]);
    merged.push_str(action_array.trim_end());
    merged.push_str(&descriptor[range.end..]);
    Ok(merged)
}

/// Byte range of the first `action-array` element, after checking the whole document
fn locate_action_array(descriptor: &str) -> Result<Range<usize>> {
    let mut reader = Reader::from_str(descriptor);
    let mut found: Option<Range<usize>> = None;
    let mut open_at: Option<usize> = None;
    let mut depth = 0usize;
    let mut document_depth = 0usize;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            Error::Descriptor(format!("malformed descriptor after byte {before}: {e}"))
        })?;
        let after = reader.buffer_position() as usize;

        match event {
            Event::Start(start) => {
                document_depth += 1;
                if open_at.is_some() {
                    depth += 1;
                } else if found.is_none() && start.local_name().as_ref() == ACTION_ARRAY {
                    open_at = Some(before);
                    depth = 1;
                }
            }
            Event::End(_) => {
                document_depth = document_depth.checked_sub(1).ok_or_else(|| {
                    Error::Descriptor(format!("unexpected closing tag at byte {before}"))
                })?;
                if let Some(start) = open_at {
                    depth -= 1;
                    if depth == 0 {
                        found = Some(start..after);
                        open_at = None;
                    }
                }
            }
            Event::Empty(empty) => {
                if open_at.is_none()
                    && found.is_none()
                    && empty.local_name().as_ref() == ACTION_ARRAY
                {
                    found = Some(before..after);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if document_depth > 0 {
        return Err(Error::Descriptor(
            "malformed descriptor: unclosed elements at end of file".to_string(),
        ));
    }
    found.ok_or_else(|| Error::Descriptor("descriptor has no action-array element".to_string()))
}
