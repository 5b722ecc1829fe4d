//! Pure slicers over a [`Frame`]. Every function returns a fresh copy.

use chrono::NaiveDateTime;

use crate::domain::{Field, Frame};
use crate::error::Result;

/// Restrict `frame` to `allow_list`, in the given order.
///
/// An empty list returns the frame unchanged; a column absent from the frame
/// is a schema error.
pub fn columns(frame: &Frame, allow_list: &[Field]) -> Result<Frame> {
    if allow_list.is_empty() {
        return Ok(frame.clone());
    }
    frame.select_fields(allow_list)
}

/// Rows by time.
///
/// Rules, first match wins:
/// - `start` and/or `end`: `start <= ix < end` (a missing bound is open)
/// - `date` alone: the row at exactly `date`, if any
/// - nothing: every row
///
/// The index must be sorted, which holds for every frame the pipeline builds.
pub fn dates(
    frame: &Frame,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    date: Option<NaiveDateTime>,
) -> Frame {
    let index = frame.index();
    match (start, end, date) {
        (None, None, None) => frame.clone(),
        (None, None, Some(d)) => {
            let lo = index.partition_point(|ts| *ts < d);
            let hi = index.partition_point(|ts| *ts <= d);
            frame.slice_rows(lo..hi)
        }
        (start, end, _) => {
            let lo = start.map_or(0, |s| index.partition_point(|ts| *ts < s));
            let hi = end.map_or(index.len(), |e| index.partition_point(|ts| *ts < e));
            frame.slice_rows(lo..hi.max(lo))
        }
    }
}
