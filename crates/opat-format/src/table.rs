//! In-memory tables: owned cell blocks with bounds-checked views

use std::fmt;

use crate::{Error, Result};

/// Half-open `[start, end)` range over rows or columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    /// First index included
    pub start: u32,
    /// First index excluded
    pub end: u32,
}

impl Slice {
    /// Create a slice over `[start, end)`
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of indices covered
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    /// True when the slice covers nothing
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slice({}..{})", self.start, self.end)
    }
}

/// One table: a `rows x cols x vector_size` block of doubles plus its axes
///
/// Cells are stored row-major with the column index next and the per-cell
/// depth innermost. The table owns three contiguous buffers (row axis,
/// column axis, cells); views produced by the accessors are deep copies, so
/// a loaded table is never mutated through them.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    row_values: Vec<f64>,
    column_values: Vec<f64>,
    data: Vec<f64>,
    vector_size: usize,
}

impl Table {
    /// Build a table from its axes and cell block
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFormat`] when `vector_size` is zero or the cell block
    /// length is not `rows * cols * vector_size`.
    pub fn new(
        row_values: Vec<f64>,
        column_values: Vec<f64>,
        data: Vec<f64>,
        vector_size: usize,
    ) -> Result<Self> {
        if vector_size == 0 {
            return Err(Error::InvalidFormat("table vector size is zero".into()));
        }
        let expected = row_values.len() * column_values.len() * vector_size;
        if data.len() != expected {
            return Err(Error::InvalidFormat(format!(
                "table cell block has {} values, {}x{}x{} needs {}",
                data.len(),
                row_values.len(),
                column_values.len(),
                vector_size,
                expected
            )));
        }
        Ok(Self {
            row_values,
            column_values,
            data,
            vector_size,
        })
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.row_values.len()
    }

    /// Number of columns
    pub fn num_cols(&self) -> usize {
        self.column_values.len()
    }

    /// Values per cell
    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    /// `(rows, cols)` shape
    pub fn size(&self) -> (usize, usize) {
        (self.num_rows(), self.num_cols())
    }

    /// Row axis values
    pub fn row_values(&self) -> &[f64] {
        &self.row_values
    }

    /// Column axis values
    pub fn column_values(&self) -> &[f64] {
        &self.column_values
    }

    /// The raw cell block
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// First stored value
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] when the table has no cells.
    pub fn first(&self) -> Result<f64> {
        self.data
            .first()
            .copied()
            .ok_or_else(|| Error::OutOfRange("table has no cells".into()))
    }

    fn check_cell(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.num_rows() || col >= self.num_cols() {
            return Err(Error::OutOfRange(format!(
                "cell ({row}, {col}) outside a {}x{} table",
                self.num_rows(),
                self.num_cols()
            )));
        }
        Ok(())
    }

    fn cell_offset(&self, row: usize, col: usize) -> usize {
        (row * self.num_cols() + col) * self.vector_size
    }

    /// Scalar at `(row, col, depth)`
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] when any index is outside the table.
    pub fn value(&self, row: usize, col: usize, depth: usize) -> Result<f64> {
        self.check_cell(row, col)?;
        if depth >= self.vector_size {
            return Err(Error::OutOfRange(format!(
                "depth {depth} outside a cell of {} values",
                self.vector_size
            )));
        }
        Ok(self.data[self.cell_offset(row, col) + depth])
    }

    /// The cell at `(row, col)` as a `(1, 1, vector_size)` table
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] when the cell is outside the table.
    pub fn cell(&self, row: usize, col: usize) -> Result<Table> {
        self.check_cell(row, col)?;
        let start = self.cell_offset(row, col);
        Table::new(
            vec![self.row_values[row]],
            vec![self.column_values[col]],
            self.data[start..start + self.vector_size].to_vec(),
            self.vector_size,
        )
    }

    /// Row `r` as a `(1, cols, vector_size)` table, column axis preserved
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] when the row is outside the table.
    pub fn row(&self, row: usize) -> Result<Table> {
        if row >= self.num_rows() {
            return Err(Error::OutOfRange(format!(
                "row {row} outside a {}-row table",
                self.num_rows()
            )));
        }
        let start = self.cell_offset(row, 0);
        let end = start + self.num_cols() * self.vector_size;
        Table::new(
            vec![self.row_values[row]],
            self.column_values.clone(),
            self.data[start..end].to_vec(),
            self.vector_size,
        )
    }

    /// Column `c` as a `(rows, 1, vector_size)` table, row axis preserved
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] when the column is outside the table.
    pub fn column(&self, col: usize) -> Result<Table> {
        if col >= self.num_cols() {
            return Err(Error::OutOfRange(format!(
                "column {col} outside a {}-column table",
                self.num_cols()
            )));
        }
        let mut data = Vec::with_capacity(self.num_rows() * self.vector_size);
        for row in 0..self.num_rows() {
            let start = self.cell_offset(row, col);
            data.extend_from_slice(&self.data[start..start + self.vector_size]);
        }
        Table::new(
            self.row_values.clone(),
            vec![self.column_values[col]],
            data,
            self.vector_size,
        )
    }

    /// Deep copy of a contiguous sub-rectangle
    ///
    /// Both slices are half-open `[start, end)`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] when a slice is reversed, empty, or reaches past
    /// the table.
    pub fn slice(&self, rows: Slice, cols: Slice) -> Result<Table> {
        if rows.start >= rows.end || cols.start >= cols.end {
            return Err(Error::OutOfRange(format!(
                "slice bounds reversed or empty: {rows}, {cols}"
            )));
        }
        if rows.end as usize > self.num_rows() || cols.end as usize > self.num_cols() {
            return Err(Error::OutOfRange(format!(
                "slice {rows}, {cols} outside a {}x{} table",
                self.num_rows(),
                self.num_cols()
            )));
        }

        let mut data = Vec::with_capacity(rows.len() * cols.len() * self.vector_size);
        for row in rows.start as usize..rows.end as usize {
            let start = self.cell_offset(row, cols.start as usize);
            let end = self.cell_offset(row, cols.end as usize);
            data.extend_from_slice(&self.data[start..end]);
        }
        Table::new(
            self.row_values[rows.start as usize..rows.end as usize].to_vec(),
            self.column_values[cols.start as usize..cols.end as usize].to_vec(),
            data,
            self.vector_size,
        )
    }

    /// The row axis as a `(rows, 1, 1)` table, suitable for plotting
    ///
    /// Axis positions become the data; the row axis of the result is the
    /// ordinal 0..rows.
    pub fn row_axis(&self) -> Table {
        let rows = self.num_rows();
        Table::new(
            (0..rows).map(|i| i as f64).collect(),
            vec![0.0],
            self.row_values.clone(),
            1,
        )
        .unwrap()
    }

    /// The column axis as a `(1, cols, 1)` table, suitable for plotting
    pub fn column_axis(&self) -> Table {
        let cols = self.num_cols();
        Table::new(
            vec![0.0],
            (0..cols).map(|i| i as f64).collect(),
            self.column_values.clone(),
            1,
        )
        .unwrap()
    }

    /// Human-readable dump: one row per line, cell values space-separated
    pub fn ascii(&self) -> String {
        let mut out = String::new();
        for row in 0..self.num_rows() {
            let start = self.cell_offset(row, 0);
            let end = start + self.num_cols() * self.vector_size;
            for value in &self.data[start..end] {
                out.push_str(&value.to_string());
                out.push(' ');
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Table(rows: {}, cols: {}, vector size: {})",
            self.num_rows(),
            self.num_cols(),
            self.vector_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x2 table with vector size 1 and cells row*10 + col
    fn small() -> Table {
        Table::new(
            vec![1.0, 2.0, 3.0],
            vec![10.0, 20.0],
            vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0],
            1,
        )
        .unwrap()
    }

    /// 2x2 table with two values per cell
    fn deep() -> Table {
        Table::new(
            vec![1.0, 2.0],
            vec![10.0, 20.0],
            (0..8).map(f64::from).collect(),
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_new_validates_lengths() {
        assert!(Table::new(vec![1.0], vec![1.0], vec![0.0; 2], 1).is_err());
        assert!(Table::new(vec![1.0], vec![1.0], vec![0.0], 0).is_err());
        assert!(Table::new(vec![], vec![], vec![], 1).is_ok());
    }

    #[test]
    fn test_value_and_cell() {
        let t = small();
        assert_eq!(t.value(0, 0, 0).unwrap(), 0.0);
        assert_eq!(t.value(2, 1, 0).unwrap(), 21.0);
        assert!(t.value(3, 0, 0).is_err());
        assert!(t.value(0, 2, 0).is_err());
        assert!(t.value(0, 0, 1).is_err());

        let cell = t.cell(1, 1).unwrap();
        assert_eq!(cell.size(), (1, 1));
        assert_eq!(cell.data(), &[11.0]);
        assert_eq!(cell.row_values(), &[2.0]);
        assert_eq!(cell.column_values(), &[20.0]);
    }

    #[test]
    fn test_deep_cells() {
        let t = deep();
        assert_eq!(t.value(0, 1, 0).unwrap(), 2.0);
        assert_eq!(t.value(0, 1, 1).unwrap(), 3.0);
        assert_eq!(t.value(1, 1, 1).unwrap(), 7.0);

        let cell = t.cell(1, 0).unwrap();
        assert_eq!(cell.vector_size(), 2);
        assert_eq!(cell.data(), &[4.0, 5.0]);
    }

    #[test]
    fn test_row_and_column_views() {
        let t = small();

        let row = t.row(1).unwrap();
        assert_eq!(row.size(), (1, 2));
        assert_eq!(row.data(), &[10.0, 11.0]);
        assert_eq!(row.row_values(), &[2.0]);
        assert_eq!(row.column_values(), &[10.0, 20.0]);

        let col = t.column(1).unwrap();
        assert_eq!(col.size(), (3, 1));
        assert_eq!(col.data(), &[1.0, 11.0, 21.0]);
        assert_eq!(col.row_values(), &[1.0, 2.0, 3.0]);
        assert_eq!(col.column_values(), &[20.0]);

        assert!(t.row(3).is_err());
        assert!(t.column(2).is_err());
    }

    #[test]
    fn test_row_column_value_agreement() {
        let t = small();
        for r in 0..3 {
            for c in 0..2 {
                let direct = t.value(r, c, 0).unwrap();
                assert_eq!(t.row(r).unwrap().value(0, c, 0).unwrap(), direct);
                assert_eq!(t.column(c).unwrap().value(r, 0, 0).unwrap(), direct);
            }
        }
    }

    #[test]
    fn test_slice() {
        let t = small();
        let s = t.slice(Slice::new(1, 3), Slice::new(0, 1)).unwrap();
        assert_eq!(s.size(), (2, 1));
        assert_eq!(s.data(), &[10.0, 20.0]);
        assert_eq!(s.row_values(), &[2.0, 3.0]);
        assert_eq!(s.column_values(), &[10.0]);
    }

    #[test]
    fn test_full_slice_is_identity() {
        let t = small();
        let s = t.slice(Slice::new(0, 3), Slice::new(0, 2)).unwrap();
        assert_eq!(s, t);
    }

    #[test]
    fn test_slice_bounds() {
        let t = small();
        assert!(t.slice(Slice::new(2, 2), Slice::new(0, 1)).is_err());
        assert!(t.slice(Slice::new(2, 1), Slice::new(0, 1)).is_err());
        assert!(t.slice(Slice::new(0, 4), Slice::new(0, 1)).is_err());
        assert!(t.slice(Slice::new(0, 1), Slice::new(0, 3)).is_err());
    }

    #[test]
    fn test_axis_tables() {
        let t = small();

        let rows = t.row_axis();
        assert_eq!(rows.size(), (3, 1));
        assert_eq!(rows.data(), &[1.0, 2.0, 3.0]);

        let cols = t.column_axis();
        assert_eq!(cols.size(), (1, 2));
        assert_eq!(cols.data(), &[10.0, 20.0]);
    }

    #[test]
    fn test_ascii() {
        let t = Table::new(vec![1.0], vec![1.0, 2.0], vec![0.5, 1.5], 1).unwrap();
        assert_eq!(t.ascii(), "0.5 1.5 \n");
    }

    #[test]
    fn test_first() {
        assert_eq!(small().first().unwrap(), 0.0);
        let empty = Table::new(vec![], vec![], vec![], 1).unwrap();
        assert!(empty.first().is_err());
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_table() -> impl Strategy<Value = Table> {
        (1usize..8, 1usize..8, 1usize..3)
            .prop_flat_map(|(rows, cols, vsize)| {
                let cells = rows * cols * vsize;
                (
                    prop::collection::vec(-1e6..1e6f64, rows),
                    prop::collection::vec(-1e6..1e6f64, cols),
                    prop::collection::vec(-1e6..1e6f64, cells),
                    Just(vsize),
                )
            })
            .prop_map(|(rows, cols, data, vsize)| Table::new(rows, cols, data, vsize).unwrap())
    }

    proptest! {
        /// Property: the full slice reproduces the table exactly
        #[test]
        fn full_slice_is_identity(t in arb_table()) {
            let s = t
                .slice(
                    Slice::new(0, t.num_rows() as u32),
                    Slice::new(0, t.num_cols() as u32),
                )
                .unwrap();
            prop_assert_eq!(s, t);
        }

        /// Property: row and column views agree with direct access
        #[test]
        fn views_agree_with_direct_access(t in arb_table()) {
            for r in 0..t.num_rows() {
                let row = t.row(r).unwrap();
                for c in 0..t.num_cols() {
                    let col = t.column(c).unwrap();
                    for d in 0..t.vector_size() {
                        let direct = t.value(r, c, d).unwrap();
                        prop_assert_eq!(row.value(0, c, d).unwrap(), direct);
                        prop_assert_eq!(col.value(r, 0, d).unwrap(), direct);
                    }
                }
            }
        }
    }
}
