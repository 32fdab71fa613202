//! Row model: ordered, normalized column/value pairs plus a source index

/// One spreadsheet row after normalization
///
/// Column order follows the sheet. Values are trimmed and empty cells are
/// dropped at construction; a `Row` is immutable afterwards. The 1-based
/// `source_index` correlates log lines and deferred retries with the sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<(String, String)>,
    source_index: usize,
}

impl Row {
    /// Build a row by zipping cell values with column names
    ///
    /// Extra cells beyond the column definitions are ignored, as are cells
    /// that are empty after trimming.
    pub fn from_cells(cells: &[String], column_names: &[String], source_index: usize) -> Self {
        let columns = column_names
            .iter()
            .zip(cells.iter())
            .filter_map(|(name, cell)| {
                let value = cell.trim();
                (!name.is_empty() && !value.is_empty())
                    .then(|| (name.clone(), value.to_string()))
            })
            .collect();
        Self {
            columns,
            source_index,
        }
    }

    /// Build a row directly from pairs (used when pipelines derive sub-rows)
    pub fn from_pairs(pairs: Vec<(String, String)>, source_index: usize) -> Self {
        let columns = pairs
            .into_iter()
            .filter_map(|(name, value)| {
                let value = value.trim().to_string();
                (!value.is_empty()).then_some((name, value))
            })
            .collect();
        Self {
            columns,
            source_index,
        }
    }

    /// 1-based index of this row in the source sheet
    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn context(&self) -> RowContext {
        RowContext {
            row: self.source_index,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate (name, value) pairs in sheet order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Sub-row of the columns starting with `prefix`, with the prefix
    /// replaced by `replacement` in the derived column names
    pub fn filtered(&self, prefix: &str, replacement: &str) -> Row {
        let columns = self
            .columns
            .iter()
            .filter_map(|(n, v)| {
                n.strip_prefix(prefix)
                    .map(|rest| (format!("{}{}", replacement, rest), v.clone()))
            })
            .collect();
        Row {
            columns,
            source_index: self.source_index,
        }
    }

    /// Sub-row of the columns starting with `prefix`, prefix stripped
    pub fn with_prefix(&self, prefix: &str) -> Row {
        self.filtered(prefix, "")
    }

    /// New row with extra pairs appended (existing names win)
    pub fn merged(&self, extra: impl IntoIterator<Item = (String, String)>) -> Row {
        let mut columns = self.columns.clone();
        for (name, value) in extra {
            if !columns.iter().any(|(n, _)| *n == name) && !value.trim().is_empty() {
                columns.push((name, value.trim().to_string()));
            }
        }
        Row {
            columns,
            source_index: self.source_index,
        }
    }
}

/// Correlation value for log attribution, threaded through calls explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowContext {
    /// 1-based source row number
    pub row: usize,
}

impl std::fmt::Display for RowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}", self.row)
    }
}
