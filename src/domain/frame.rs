//! Time-indexed tables.
//!
//! - [`Table`]: per-source output of the cleaners. Cells may be missing.
//! - [`Frame`]: dense table; the canonical table and every slice of it.
//!
//! Both are column-major with a `longdate` index shared by all columns.

use std::collections::HashMap;
use std::ops::Range;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::dates;
use crate::domain::Field;
use crate::error::{PipelineError, Result};

/// Name of the index column.
pub const INDEX_NAME: &str = "longdate";

/// A table whose cells may be missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    index: Vec<NaiveDateTime>,
    fields: Vec<Field>,
    columns: Vec<Vec<Option<f64>>>,
}

impl Table {
    pub fn new(
        index: Vec<NaiveDateTime>,
        fields: Vec<Field>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        check_shape(index.len(), &fields, columns.iter().map(Vec::len))?;
        Ok(Self {
            index,
            fields,
            columns,
        })
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, field: Field) -> Option<&[Option<f64>]> {
        self.position(field).map(|i| self.columns[i].as_slice())
    }

    fn position(&self, field: Field) -> Option<usize> {
        self.fields.iter().position(|f| *f == field)
    }

    /// Reindex on the complete hourly grid `[min, max]`.
    ///
    /// Timestamps of the grid absent from the table become missing rows;
    /// timestamps that are not on the grid are dropped.
    pub fn reindex_hourly(&self) -> Table {
        let (Some(&first), Some(&last)) = (self.index.first(), self.index.last()) else {
            return self.clone();
        };
        let grid = hourly_grid(first, last);
        let lookup: HashMap<NaiveDateTime, usize> =
            self.index.iter().enumerate().map(|(i, ts)| (*ts, i)).collect();

        let columns = self
            .columns
            .iter()
            .map(|col| {
                grid.iter()
                    .map(|ts| lookup.get(ts).and_then(|&i| col[i]))
                    .collect()
            })
            .collect();

        Table {
            index: grid,
            fields: self.fields.clone(),
            columns,
        }
    }

    /// Fill missing cells by linear interpolation over row positions.
    ///
    /// Interior gaps are interpolated, trailing gaps repeat the last observed
    /// value, leading gaps stay missing.
    pub fn interpolate_linear(&mut self) {
        for col in &mut self.columns {
            interpolate_column(col);
        }
    }

    /// Left join on the index. Rows of `self` without a match in `other` get
    /// missing cells for `other`'s columns.
    pub fn left_join(&self, other: &Table) -> Result<Table> {
        if let Some(dup) = other.fields.iter().find(|f| self.fields.contains(f)) {
            return Err(PipelineError::Schema(format!(
                "column '{dup}' is present on both sides of the join"
            )));
        }
        let lookup: HashMap<NaiveDateTime, usize> =
            other.index.iter().enumerate().map(|(i, ts)| (*ts, i)).collect();

        let mut fields = self.fields.clone();
        let mut columns = self.columns.clone();
        for (field, col) in other.fields.iter().zip(&other.columns) {
            fields.push(*field);
            columns.push(
                self.index
                    .iter()
                    .map(|ts| lookup.get(ts).and_then(|&i| col[i]))
                    .collect(),
            );
        }

        Ok(Table {
            index: self.index.clone(),
            fields,
            columns,
        })
    }

    /// Remove every row with at least one missing cell.
    pub fn drop_missing_rows(&self) -> Frame {
        let keep: Vec<usize> = (0..self.index.len())
            .filter(|&row| self.columns.iter().all(|col| col[row].is_some()))
            .collect();

        Frame {
            index: keep.iter().map(|&row| self.index[row]).collect(),
            fields: self.fields.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| keep.iter().filter_map(|&row| col[row]).collect())
                .collect(),
        }
    }
}

/// A dense, time-indexed table.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Frame {
    index: Vec<NaiveDateTime>,
    fields: Vec<Field>,
    columns: Vec<Vec<f64>>,
}

impl Frame {
    pub fn new(index: Vec<NaiveDateTime>, fields: Vec<Field>, columns: Vec<Vec<f64>>) -> Result<Self> {
        check_shape(index.len(), &fields, columns.iter().map(Vec::len))?;
        Ok(Self {
            index,
            fields,
            columns,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, field: Field) -> Option<&[f64]> {
        self.fields
            .iter()
            .position(|f| *f == field)
            .map(|i| self.columns[i].as_slice())
    }

    /// Column lookup that fails with a schema error naming the column.
    pub fn require(&self, field: Field) -> Result<&[f64]> {
        self.column(field)
            .ok_or_else(|| PipelineError::Schema(format!("column '{field}' is missing")))
    }

    /// Values of one row, in field order.
    pub fn row(&self, row: usize) -> Option<Vec<f64>> {
        (row < self.len()).then(|| self.columns.iter().map(|col| col[row]).collect())
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.last().copied()
    }

    /// Copy of a contiguous block of rows.
    pub fn slice_rows(&self, rows: Range<usize>) -> Frame {
        let rows = rows.start.min(self.len())..rows.end.min(self.len());
        Frame {
            index: self.index[rows.clone()].to_vec(),
            fields: self.fields.clone(),
            columns: self.columns.iter().map(|c| c[rows.clone()].to_vec()).collect(),
        }
    }

    /// Copy restricted to `fields`, in the given order.
    pub fn select_fields(&self, fields: &[Field]) -> Result<Frame> {
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            columns.push(self.require(*field)?.to_vec());
        }
        Ok(Frame {
            index: self.index.clone(),
            fields: fields.to_vec(),
            columns,
        })
    }

    /// True when the index is strictly increasing with a one-hour step.
    pub fn is_hourly_contiguous(&self) -> bool {
        self.index.iter().all(|ts| dates::is_hour_aligned(*ts))
            && self
                .index
                .windows(2)
                .all(|w| w[1] - w[0] == Duration::hours(1))
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.index.windows(2).all(|w| w[0] < w[1])
    }
}

fn check_shape(rows: usize, fields: &[Field], lens: impl Iterator<Item = usize>) -> Result<()> {
    let lens: Vec<usize> = lens.collect();
    if lens.len() != fields.len() {
        return Err(PipelineError::Schema(format!(
            "{} columns for {} fields",
            lens.len(),
            fields.len()
        )));
    }
    if let Some((field, len)) = fields.iter().zip(&lens).find(|(_, len)| **len != rows) {
        return Err(PipelineError::Schema(format!(
            "column '{field}' has {len} values for {rows} index entries"
        )));
    }
    for (i, field) in fields.iter().enumerate() {
        if fields[..i].contains(field) {
            return Err(PipelineError::Schema(format!("duplicate column '{field}'")));
        }
    }
    Ok(())
}

/// All hourly timestamps from `first` to `last` inclusive.
pub fn hourly_grid(first: NaiveDateTime, last: NaiveDateTime) -> Vec<NaiveDateTime> {
    let mut grid = Vec::new();
    let mut ts = first;
    while ts <= last {
        grid.push(ts);
        ts += Duration::hours(1);
    }
    grid
}

fn interpolate_column(col: &mut [Option<f64>]) {
    let mut prev: Option<(usize, f64)> = None;
    for i in 0..col.len() {
        let Some(v) = col[i] else { continue };
        if let Some((j, pv)) = prev {
            let gap = (i - j) as f64;
            for k in (j + 1)..i {
                let u = (k - j) as f64 / gap;
                col[k] = Some(pv + u * (v - pv));
            }
        }
        prev = Some((i, v));
    }
    if let Some((j, pv)) = prev {
        for cell in col.iter_mut().skip(j + 1) {
            *cell = Some(pv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hour(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn interpolation_fills_interior_and_trailing_gaps_only() {
        let mut col = vec![None, Some(1.0), None, None, Some(4.0), None];
        interpolate_column(&mut col);
        assert_eq!(col, vec![None, Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(4.0)]);
    }

    #[test]
    fn reindex_inserts_missing_hours() {
        let table = Table::new(
            vec![hour(1, 0), hour(1, 3)],
            vec![Field::Sun],
            vec![vec![Some(0.0), Some(30.0)]],
        )
        .unwrap();
        let mut hourly = table.reindex_hourly();
        assert_eq!(hourly.len(), 4);
        assert_eq!(hourly.column(Field::Sun).unwrap()[1], None);

        hourly.interpolate_linear();
        assert_eq!(
            hourly.column(Field::Sun).unwrap(),
            &[Some(0.0), Some(10.0), Some(20.0), Some(30.0)]
        );
    }

    #[test]
    fn left_join_keeps_left_index() {
        let left = Table::new(
            vec![hour(1, 0), hour(1, 1), hour(1, 2)],
            vec![Field::Consommation],
            vec![vec![Some(1.0), Some(2.0), Some(3.0)]],
        )
        .unwrap();
        let right = Table::new(
            vec![hour(1, 1), hour(1, 2), hour(1, 3)],
            vec![Field::Tmoy],
            vec![vec![Some(10.0), Some(11.0), Some(12.0)]],
        )
        .unwrap();

        let joined = left.left_join(&right).unwrap();
        assert_eq!(joined.index(), left.index());
        assert_eq!(joined.column(Field::Tmoy).unwrap(), &[None, Some(10.0), Some(11.0)]);

        let dense = joined.drop_missing_rows();
        assert_eq!(dense.len(), 2);
        assert_eq!(dense.first_timestamp(), Some(hour(1, 1)));
        assert!(dense.is_hourly_contiguous());
    }

    #[test]
    fn join_rejects_overlapping_columns() {
        let a = Table::new(vec![hour(1, 0)], vec![Field::Code], vec![vec![Some(1.0)]]).unwrap();
        let err = a.left_join(&a).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn frame_shape_is_checked() {
        let err = Frame::new(vec![hour(1, 0)], vec![Field::Gaz], vec![vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));

        let err = Frame::new(
            vec![hour(1, 0)],
            vec![Field::Gaz, Field::Gaz],
            vec![vec![1.0], vec![2.0]],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn select_fields_preserves_requested_order() {
        let frame = Frame::new(
            vec![hour(1, 0)],
            vec![Field::Gaz, Field::Fioul],
            vec![vec![1.0], vec![2.0]],
        )
        .unwrap();
        let picked = frame.select_fields(&[Field::Fioul, Field::Gaz]).unwrap();
        assert_eq!(picked.fields(), &[Field::Fioul, Field::Gaz]);
        assert_eq!(picked.row(0).unwrap(), vec![2.0, 1.0]);
        assert!(frame.select_fields(&[Field::Sun]).is_err());
    }
}
