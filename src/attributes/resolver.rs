//! Raw value → attribute index.

use super::descriptor::AttributeDescriptor;
use crate::error::{AppResult, DaqError};

/// Map a raw register value onto a position in the candidate table.
///
/// Candidates are scanned in order and the first one within `tolerance` of
/// `raw` wins, so an overly loose tolerance resolves to the lower index rather
/// than an arbitrary one.
///
/// # Errors
///
/// [`DaqError::NoMatchingValue`] when no candidate is close enough. There is no
/// fallback to index 0.
pub fn resolve(descriptor: &AttributeDescriptor, raw: f64) -> AppResult<usize> {
    descriptor
        .candidates
        .iter()
        .position(|candidate| (raw - candidate).abs() <= descriptor.tolerance)
        .ok_or_else(|| DaqError::NoMatchingValue {
            attribute: descriptor.name.clone(),
            raw,
        })
}
