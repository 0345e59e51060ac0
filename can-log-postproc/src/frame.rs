//! Time-indexed signal tables
//!
//! A [`SignalFrame`] holds one timestamp column `t` (microseconds since the
//! Unix epoch) and any number of named, nullable columns. It offers exactly
//! the table operations the post-processor needs: row concatenation,
//! inner join on `t`, resampling onto a fixed grid, row filtering and a
//! stable sort by time.

use crate::types::{ProcessorError, Result};
use std::collections::{HashMap, HashSet};

const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// Values of one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Physical signal values (decoded signals are always numeric)
    Numeric(Vec<Option<f64>>),
    /// Text values, e.g. the `Message` provenance column
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(values) => values.get(row).map_or(true, Option::is_none),
            ColumnData::Text(values) => values.get(row).map_or(true, Option::is_none),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ColumnData::Numeric(_) => "numeric",
            ColumnData::Text(_) => "text",
        }
    }

    /// An all-null column of the same kind
    fn nulls_like(&self, len: usize) -> ColumnData {
        match self {
            ColumnData::Numeric(_) => ColumnData::Numeric(vec![None; len]),
            ColumnData::Text(_) => ColumnData::Text(vec![None; len]),
        }
    }

    fn push_nulls(&mut self, count: usize) {
        match self {
            ColumnData::Numeric(values) => values.extend(std::iter::repeat(None).take(count)),
            ColumnData::Text(values) => values.extend(std::iter::repeat(None).take(count)),
        }
    }

    fn append(&mut self, name: &str, other: &ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Numeric(values), ColumnData::Numeric(more)) => {
                values.extend_from_slice(more);
                Ok(())
            }
            (ColumnData::Text(values), ColumnData::Text(more)) => {
                values.extend_from_slice(more);
                Ok(())
            }
            (mine, theirs) => Err(ProcessorError::SchemaMismatch(format!(
                "column {} is {} in one frame and {} in another",
                name,
                mine.kind_name(),
                theirs.kind_name()
            ))),
        }
    }

    fn take(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(values) => {
                ColumnData::Numeric(rows.iter().map(|&row| values[row]).collect())
            }
            ColumnData::Text(values) => {
                ColumnData::Text(rows.iter().map(|&row| values[row].clone()).collect())
            }
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// A time-indexed table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalFrame {
    t: Vec<i64>,
    columns: Vec<Column>,
}

impl SignalFrame {
    /// Create a frame with the given timestamps and no columns
    pub fn new(t: Vec<i64>) -> Self {
        Self {
            t,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.t
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Values of a numeric column
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(values)) => Some(values),
            _ => None,
        }
    }

    /// Values of a numeric column, or `SignalNotFound`
    pub fn require_numeric(&self, name: &str) -> Result<&[Option<f64>]> {
        self.numeric(name)
            .ok_or_else(|| ProcessorError::SignalNotFound(name.to_string()))
    }

    /// Values of a text column
    pub fn text(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Text(values)) => Some(values),
            _ => None,
        }
    }

    /// Add a column, replacing any existing column of the same name
    pub fn insert_column(&mut self, name: impl Into<String>, data: ColumnData) -> Result<()> {
        let name = name.into();
        if data.len() != self.len() {
            return Err(ProcessorError::SchemaMismatch(format!(
                "column {} has {} rows, frame has {}",
                name,
                data.len(),
                self.len()
            )));
        }

        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.data = data,
            None => self.columns.push(Column { name, data }),
        }
        Ok(())
    }

    /// Builder form of [`SignalFrame::insert_column`]
    pub fn with_column(mut self, name: impl Into<String>, data: ColumnData) -> Result<Self> {
        self.insert_column(name, data)?;
        Ok(self)
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let position = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(position))
    }

    /// Keep only the named columns, in the given order
    pub fn select(&self, names: &[&str]) -> Result<SignalFrame> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| ProcessorError::SignalNotFound(name.to_string()))?;
            columns.push(column.clone());
        }
        Ok(SignalFrame {
            t: self.t.clone(),
            columns,
        })
    }

    /// Rename every column to `{prefix}_{column}`
    pub fn prefix_columns(&mut self, prefix: &str) {
        for column in &mut self.columns {
            column.name = format!("{}_{}", prefix, column.name);
        }
    }

    /// Rows at the given positions, in the given order
    pub fn take_rows(&self, rows: &[usize]) -> SignalFrame {
        SignalFrame {
            t: rows.iter().map(|&row| self.t[row]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(rows),
                })
                .collect(),
        }
    }

    /// Rows whose mask entry is true
    pub fn filter_rows(&self, keep: &[bool]) -> SignalFrame {
        let rows: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(row, &k)| k.then_some(row))
            .collect();
        self.take_rows(&rows)
    }

    /// Drop rows in which every column is null
    pub fn drop_all_null_rows(&self) -> SignalFrame {
        let keep: Vec<bool> = (0..self.len())
            .map(|row| self.columns.iter().any(|c| !c.data.is_null(row)))
            .collect();
        self.filter_rows(&keep)
    }

    pub fn is_sorted(&self) -> bool {
        self.t.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Stable sort of all rows by timestamp
    pub fn sort_by_time(&mut self) {
        if self.is_sorted() {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&row| self.t[row]);
        *self = self.take_rows(&order);
    }

    /// Resample onto a grid of `step_us` microseconds
    ///
    /// The grid starts at midnight (UTC) of the first sample's day and spans
    /// the floor of the first and last timestamps. Each grid point takes the
    /// whole row of the latest sample `s` with `g - step <= s.t <= g` (a
    /// forward fill limited to one step); grid points without such a sample
    /// and rows that are entirely null are dropped.
    pub fn resample(&self, step_us: i64) -> SignalFrame {
        if self.is_empty() || step_us <= 0 {
            return self.clone();
        }

        let mut sorted = self.clone();
        sorted.sort_by_time();
        let t = &sorted.t;

        let origin = t[0].div_euclid(MICROS_PER_DAY) * MICROS_PER_DAY;
        let floor = |ts: i64| origin + (ts - origin).div_euclid(step_us) * step_us;
        let last = floor(t[t.len() - 1]);

        let mut grid = Vec::new();
        let mut rows = Vec::new();
        let mut seen = 0usize;
        let mut g = floor(t[0]);

        while g <= last {
            while seen < t.len() && t[seen] <= g {
                seen += 1;
            }
            if seen > 0 && t[seen - 1] >= g - step_us {
                grid.push(g);
                rows.push(seen - 1);
                g += step_us;
            } else if seen < t.len() {
                // Jump over the gap to the first grid point at or after the next sample
                let next = floor(t[seen]);
                g = if next == t[seen] { next } else { next + step_us };
            } else {
                break;
            }
        }

        let mut resampled = sorted.take_rows(&rows);
        resampled.t = grid;
        resampled.drop_all_null_rows()
    }

    /// Stack frames by rows
    ///
    /// Columns are the union of all inputs in order of first appearance;
    /// cells a frame does not provide are null. The result is not sorted.
    pub fn concat_rows(frames: Vec<SignalFrame>) -> Result<SignalFrame> {
        let mut t: Vec<i64> = Vec::new();
        let mut columns: Vec<Column> = Vec::new();

        for frame in frames {
            let offset = t.len();

            for column in &frame.columns {
                if !columns.iter().any(|c| c.name == column.name) {
                    columns.push(Column {
                        name: column.name.clone(),
                        data: column.data.nulls_like(offset),
                    });
                }
            }

            for column in columns.iter_mut() {
                match frame.column(&column.name) {
                    Some(source) => column.data.append(&column.name, &source.data)?,
                    None => column.data.push_nulls(frame.len()),
                }
            }

            t.extend_from_slice(&frame.t);
        }

        Ok(SignalFrame { t, columns })
    }

    /// Join frames column-wise, keeping only timestamps present in every frame
    ///
    /// Rows follow the first frame's order. When two frames carry a column of
    /// the same name, the first one wins.
    pub fn inner_join(frames: Vec<SignalFrame>) -> SignalFrame {
        let mut frames = frames.into_iter();
        let Some(first) = frames.next() else {
            return SignalFrame::default();
        };
        let others: Vec<SignalFrame> = frames.collect();

        let mut seen = HashSet::new();
        let mut common: Vec<i64> = first.t.iter().copied().filter(|t| seen.insert(*t)).collect();
        for other in &others {
            let present: HashSet<i64> = other.t.iter().copied().collect();
            common.retain(|t| present.contains(t));
        }

        let mut joined = SignalFrame::new(common.clone());
        for frame in std::iter::once(&first).chain(others.iter()) {
            let mut positions: HashMap<i64, usize> = HashMap::with_capacity(frame.len());
            for (row, t) in frame.t.iter().enumerate() {
                positions.entry(*t).or_insert(row);
            }
            let rows: Vec<usize> = common.iter().map(|t| positions[t]).collect();

            for column in frame.take_rows(&rows).columns {
                if joined.has_column(&column.name) {
                    log::debug!("Join: keeping first column named {}", column.name);
                    continue;
                }
                joined.columns.push(column);
            }
        }
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1_000_000;

    fn numeric(values: &[Option<f64>]) -> ColumnData {
        ColumnData::Numeric(values.to_vec())
    }

    fn frame(t: &[i64], name: &str, values: &[Option<f64>]) -> SignalFrame {
        SignalFrame::new(t.to_vec())
            .with_column(name, numeric(values))
            .unwrap()
    }

    #[test]
    fn test_insert_column_length_check() {
        let mut f = SignalFrame::new(vec![0, 1]);
        assert!(f.insert_column("A", numeric(&[Some(1.0)])).is_err());
        assert!(f.insert_column("A", numeric(&[Some(1.0), None])).is_ok());
        f.insert_column("A", numeric(&[Some(2.0), Some(3.0)])).unwrap();
        assert_eq!(f.columns().len(), 1);
        assert_eq!(f.numeric("A").unwrap(), &[Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_concat_rows_unions_columns() {
        let a = frame(&[0], "Speed", &[Some(10.0)]);
        let b = frame(&[0], "Rpm", &[Some(900.0)]);
        let c = frame(&[0], "Speed", &[Some(11.0)]);

        let combined = SignalFrame::concat_rows(vec![a, b, c]).unwrap();
        assert_eq!(combined.len(), 3);
        assert_eq!(combined.column_names(), vec!["Speed", "Rpm"]);
        assert_eq!(combined.numeric("Speed").unwrap(), &[Some(10.0), None, Some(11.0)]);
        assert_eq!(combined.numeric("Rpm").unwrap(), &[None, Some(900.0), None]);
    }

    #[test]
    fn test_concat_rows_kind_mismatch() {
        let a = frame(&[0], "X", &[Some(1.0)]);
        let b = SignalFrame::new(vec![1])
            .with_column("X", ColumnData::Text(vec![Some("a".into())]))
            .unwrap();
        assert!(matches!(
            SignalFrame::concat_rows(vec![a, b]),
            Err(ProcessorError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_inner_join_keeps_common_timestamps() {
        let a = frame(&[0, SEC, 2 * SEC], "Speed", &[Some(1.0), Some(2.0), Some(3.0)]);
        let b = frame(&[SEC, 2 * SEC, 3 * SEC], "Rpm", &[Some(10.0), Some(20.0), Some(30.0)]);

        let joined = SignalFrame::inner_join(vec![a, b]);
        assert_eq!(joined.timestamps(), &[SEC, 2 * SEC]);
        assert_eq!(joined.numeric("Speed").unwrap(), &[Some(2.0), Some(3.0)]);
        assert_eq!(joined.numeric("Rpm").unwrap(), &[Some(10.0), Some(20.0)]);
    }

    #[test]
    fn test_inner_join_first_duplicate_wins() {
        let a = frame(&[0], "Value", &[Some(1.0)]);
        let b = frame(&[0], "Value", &[Some(2.0)]);
        let joined = SignalFrame::inner_join(vec![a, b]);
        assert_eq!(joined.columns().len(), 1);
        assert_eq!(joined.numeric("Value").unwrap(), &[Some(1.0)]);
    }

    #[test]
    fn test_sort_by_time_is_stable() {
        let mut f = frame(&[2, 1, 1, 0], "V", &[Some(0.0), Some(1.0), Some(2.0), Some(3.0)]);
        f.sort_by_time();
        assert_eq!(f.timestamps(), &[0, 1, 1, 2]);
        assert_eq!(f.numeric("V").unwrap(), &[Some(3.0), Some(1.0), Some(2.0), Some(0.0)]);
    }

    #[test]
    fn test_resample_limits_forward_fill_to_one_step() {
        // samples at 0.3s and 3.2s on a 1s grid
        let f = frame(&[300_000, 3_200_000], "V", &[Some(1.0), Some(2.0)]);
        let r = f.resample(SEC);

        // 1s takes the 0.3s sample (one fill), 2s is too far away, 3s has no
        // sample yet, and the grid ends at floor(3.2s) = 3s
        assert_eq!(r.timestamps(), &[SEC]);
        assert_eq!(r.numeric("V").unwrap(), &[Some(1.0)]);
    }

    #[test]
    fn test_resample_exact_hits_and_fill() {
        let f = frame(
            &[0, SEC, 1_500_000, 4 * SEC],
            "V",
            &[Some(1.0), Some(2.0), Some(3.0), Some(4.0)],
        );
        let r = f.resample(SEC);
        assert_eq!(r.timestamps(), &[0, SEC, 2 * SEC, 4 * SEC]);
        assert_eq!(
            r.numeric("V").unwrap(),
            &[Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn test_resample_grid_starts_at_midnight() {
        // 7s does not divide a day: the epoch grid would be offset by 2s here
        let midnight = 1_704_153_600 * SEC;
        let f = frame(
            &[midnight + 10 * SEC, midnight + 15 * SEC, midnight + 22 * SEC],
            "V",
            &[Some(1.0), Some(2.0), Some(3.0)],
        );
        let r = f.resample(7 * SEC);
        assert_eq!(r.timestamps(), &[midnight + 14 * SEC, midnight + 21 * SEC]);
        assert_eq!(r.numeric("V").unwrap(), &[Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_resample_drops_all_null_rows() {
        let f = frame(&[0, SEC], "V", &[None, Some(5.0)]);
        let r = f.resample(SEC);
        assert_eq!(r.timestamps(), &[SEC]);
    }

    #[test]
    fn test_drop_all_null_rows() {
        let f = SignalFrame::new(vec![0, 1, 2])
            .with_column("A", numeric(&[None, Some(1.0), None]))
            .unwrap()
            .with_column("B", numeric(&[None, None, Some(2.0)]))
            .unwrap();
        let kept = f.drop_all_null_rows();
        assert_eq!(kept.timestamps(), &[1, 2]);
    }

    #[test]
    fn test_select_and_prefix() {
        let mut f = frame(&[0], "Speed", &[Some(1.0)])
            .with_column("Rpm", numeric(&[Some(2.0)]))
            .unwrap();
        assert!(f.select(&["Missing"]).is_err());
        assert_eq!(f.select(&["Rpm"]).unwrap().column_names(), vec!["Rpm"]);

        f.prefix_columns("CAN1_Engine");
        assert_eq!(f.column_names(), vec!["CAN1_Engine_Speed", "CAN1_Engine_Rpm"]);
    }
}
