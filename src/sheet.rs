//! A spreadsheet and the read/write/append operations on its sheets.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::address::{sheet_reference, write_range, CellRange, CellRef, EndColumnRule};
use crate::client::SheetsSession;
use crate::error::{Result, WorkspaceError};
use crate::models::{AppendValuesResponse, UpdateValuesResponse};
use crate::table::Table;

/// Snapshot of one sheet's properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetInfo {
    pub sheet_id: i64,
    /// `(row_count, column_count)` of the grid.
    pub shape: (u32, u32),
}

/// One remote spreadsheet.
///
/// Sheet metadata is fetched when the document is opened and only updated by
/// [`SheetDocument::refresh`].
pub struct SheetDocument {
    session: SheetsSession,
    id: String,
    sheets: BTreeMap<String, SheetInfo>,
    end_column_rule: EndColumnRule,
}

impl SheetDocument {
    /// Open a spreadsheet and fetch its sheet metadata.
    pub async fn open(session: SheetsSession, spreadsheet_id: impl Into<String>) -> Result<Self> {
        let mut document = Self {
            session,
            id: spreadsheet_id.into(),
            sheets: BTreeMap::new(),
            end_column_rule: EndColumnRule::default(),
        };
        document.refresh().await?;
        Ok(document)
    }

    /// Choose how write ranges derive their last column.
    pub fn with_end_column_rule(mut self, rule: EndColumnRule) -> Self {
        self.end_column_rule = rule;
        self
    }

    /// Retake the sheet metadata snapshot.
    #[instrument(skip(self), fields(spreadsheet = %self.id))]
    pub async fn refresh(&mut self) -> Result<()> {
        let spreadsheet = self
            .session
            .get_spreadsheet(&self.id)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to fetch spreadsheet metadata"))?;

        self.sheets = spreadsheet
            .sheets
            .into_iter()
            .map(|sheet| {
                let props = sheet.properties;
                let info = SheetInfo {
                    sheet_id: props.sheet_id,
                    shape: (props.grid_properties.row_count, props.grid_properties.column_count),
                };
                (props.title, info)
            })
            .collect();

        debug!(sheets = self.sheets.len(), "Loaded sheet metadata");
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sheets(&self) -> &BTreeMap<String, SheetInfo> {
        &self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetInfo> {
        self.sheets.get(name)
    }

    pub fn end_column_rule(&self) -> EndColumnRule {
        self.end_column_rule
    }

    /// Read a range of cell values, or the whole sheet when `range` is `None`.
    ///
    /// Rows come back as the API returns them: trailing empty cells and rows
    /// are omitted, so the grid may be ragged.
    #[instrument(skip(self), fields(spreadsheet = %self.id))]
    pub async fn read_sheet(&self, sheet_name: &str, range: Option<&CellRange>) -> Result<Vec<Vec<Value>>> {
        let reference = sheet_reference(sheet_name, range);
        let values = self
            .session
            .get_values(&self.id, &reference)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to read sheet"))?;
        Ok(values.values)
    }

    /// Read a range as a table whose first row is the header.
    pub async fn read_sheet_as_table(&self, sheet_name: &str, range: Option<&CellRange>) -> Result<Table> {
        let rows = self.read_sheet(sheet_name, range).await?;
        Table::from_rows(rows)
    }

    /// Range a write of `values` starting at `start` covers: one row per entry
    /// of `values`, as many columns as its first row.
    pub fn write_range_for(&self, values: &[Vec<Value>], start: CellRef) -> Result<CellRange> {
        let cols = values.first().map(Vec::len).unwrap_or(0);
        write_range(start, values.len(), cols, self.end_column_rule)
    }

    /// Write `values` starting at `start`. Strings are interpreted as if typed
    /// by a user, so formulas evaluate and numbers and dates are parsed.
    #[instrument(skip(self, values), fields(spreadsheet = %self.id, rows = values.len()))]
    pub async fn write_to_sheet(&self, sheet_name: &str, values: Vec<Vec<Value>>, start: CellRef) -> Result<UpdateValuesResponse> {
        let range = self.write_range_for(&values, start)?;
        let reference = sheet_reference(sheet_name, Some(&range));

        self.session
            .update_values(&self.id, &reference, values)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to write sheet"))
    }

    /// Write a table, header row first, starting at `start`.
    pub async fn write_table_to_sheet(&self, sheet_name: &str, table: &Table, start: CellRef) -> Result<UpdateValuesResponse> {
        self.write_to_sheet(sheet_name, table.to_rows(), start).await
    }

    /// Append rows after the last populated row of the sheet.
    #[instrument(skip(self, values), fields(spreadsheet = %self.id, rows = values.len()))]
    pub async fn append_to_sheet(&self, sheet_name: &str, values: Vec<Vec<Value>>) -> Result<AppendValuesResponse> {
        if values.is_empty() {
            return Err(WorkspaceError::EmptyValues);
        }

        self.session
            .append_values(&self.id, &sheet_reference(sheet_name, None), values)
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to append to sheet"))
    }

    /// Append a table's data rows; the header is assumed to be on the sheet already.
    pub async fn append_table_to_sheet(&self, sheet_name: &str, table: &Table) -> Result<AppendValuesResponse> {
        self.append_to_sheet(sheet_name, table.rows().to_vec()).await
    }
}

impl std::fmt::Debug for SheetDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetDocument")
            .field("id", &self.id)
            .field("sheets", &self.sheets)
            .field("end_column_rule", &self.end_column_rule)
            .finish()
    }
}
