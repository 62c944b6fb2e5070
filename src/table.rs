//! Conversion between a table with named columns and plain rows of cells.

use serde_json::Value;

use crate::error::{Result, WorkspaceError};

/// Rows of cells under a header of column names.
///
/// Every row holds exactly one cell per column; missing trailing cells are
/// filled with `Value::Null` on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Build a table from a value grid whose first row is the header.
    ///
    /// Sheets omits trailing empty cells, so short rows are padded.
    pub fn from_rows(mut grid: Vec<Vec<Value>>) -> Result<Self> {
        if grid.is_empty() {
            return Ok(Self::default());
        }

        let header = grid.remove(0);
        let columns = header.iter().map(cell_to_string).collect();
        Self::new(columns, grid)
    }

    /// Header row followed by the data rows.
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        let header = self.columns.iter().cloned().map(Value::String).collect();
        std::iter::once(header).chain(self.rows.iter().cloned()).collect()
    }

    /// Append a row, padding it to the table width.
    pub fn push_row(&mut self, mut row: Vec<Value>) -> Result<()> {
        if row.len() > self.columns.len() {
            return Err(WorkspaceError::RaggedRow {
                row: self.rows.len(),
                len: row.len(),
                columns: self.columns.len(),
            });
        }
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Cells of the named column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
