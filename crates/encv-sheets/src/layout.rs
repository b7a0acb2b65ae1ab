use std::collections::HashSet;
use std::path::Path;

use encv_core::{ConfigError, DATE_COLUMN};
use serde::{Deserialize, Serialize};

/// Where one record field lands in the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetColumn {
    pub field: String,
    /// Column letters, e.g. `C`.
    pub column: String,
}

impl SheetColumn {
    #[must_use]
    pub fn new(field: &str, column: &str) -> Self {
        Self {
            field: field.to_string(),
            column: column.to_string(),
        }
    }
}

/// Static mapping from record fields to sheet columns.
///
/// Row 1 is a header. The date column drives resume-point discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub date_column: String,
    pub columns: Vec<SheetColumn>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            date_column: "B".to_string(),
            columns: vec![
                SheetColumn::new("codes_issued", "C"),
                SheetColumn::new("codes_claimed", "D"),
            ],
        }
    }
}

impl SheetLayout {
    /// Load and validate a layout from a YAML file.
    ///
    /// ```yaml
    /// date_column: B
    /// columns:
    ///   - field: codes_issued
    ///     column: C
    ///   - field: codes_claimed
    ///     column: D
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if the YAML cannot be parsed or fails validation.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut layout: SheetLayout = serde_yaml::from_str(content)?;
        layout.normalize();
        layout.validate()?;
        Ok(layout)
    }

    /// The whole date column of `sheet` in A1 notation, e.g. `'Source Data'!B:B`.
    #[must_use]
    pub fn date_range(&self, sheet: &str) -> String {
        format!(
            "{}!{}:{}",
            quote_sheet(sheet),
            self.date_column,
            self.date_column
        )
    }

    /// An open-ended range in `column` starting at `first_row`.
    #[must_use]
    pub fn column_range(sheet: &str, column: &str, first_row: usize) -> String {
        format!("{}!{column}{first_row}:{column}", quote_sheet(sheet))
    }

    fn normalize(&mut self) {
        self.date_column = self.date_column.trim().to_ascii_uppercase();
        for column in &mut self.columns {
            column.column = column.column.trim().to_ascii_uppercase();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut letters = HashSet::new();
        let mut fields = HashSet::new();

        if !is_column_letters(&self.date_column) {
            return Err(ConfigError::Validation(format!(
                "date_column '{}' is not a column letter",
                self.date_column
            )));
        }
        letters.insert(self.date_column.as_str());

        for column in &self.columns {
            if !is_column_letters(&column.column) {
                return Err(ConfigError::Validation(format!(
                    "column '{}' for field '{}' is not a column letter",
                    column.column, column.field
                )));
            }
            if column.field == DATE_COLUMN {
                return Err(ConfigError::Validation(
                    "`date` is mapped by date_column, not columns".to_string(),
                ));
            }
            if !letters.insert(column.column.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "column {} is mapped twice",
                    column.column
                )));
            }
            if !fields.insert(column.field.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "field '{}' is mapped twice",
                    column.field
                )));
            }
        }
        Ok(())
    }
}

/// Sheet names are always quoted; embedded quotes are doubled.
pub(crate) fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

fn is_column_letters(s: &str) -> bool {
    (1..=3).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_b_c_d() {
        let layout = SheetLayout::default();
        assert_eq!(layout.date_column, "B");
        assert_eq!(layout.columns[0], SheetColumn::new("codes_issued", "C"));
        assert_eq!(layout.columns[1], SheetColumn::new("codes_claimed", "D"));
    }

    #[test]
    fn ranges_quote_the_sheet_name() {
        let layout = SheetLayout::default();
        assert_eq!(layout.date_range("Source Data"), "'Source Data'!B:B");
        assert_eq!(
            SheetLayout::column_range("Bob's", "C", 8),
            "'Bob''s'!C8:C"
        );
    }

    #[test]
    fn from_yaml_normalizes_letters() {
        let layout = SheetLayout::from_yaml(
            "date_column: b\ncolumns:\n  - field: codes_issued\n    column: ' e '\n",
        )
        .unwrap();
        assert_eq!(layout.date_column, "B");
        assert_eq!(layout.columns[0].column, "E");
    }

    #[test]
    fn from_yaml_rejects_duplicate_columns() {
        let yaml = "date_column: B\ncolumns:\n  - field: a\n    column: B\n";
        assert!(matches!(
            SheetLayout::from_yaml(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn from_yaml_rejects_bad_letters_and_date_field() {
        assert!(SheetLayout::from_yaml("date_column: B2\ncolumns: []\n").is_err());
        assert!(SheetLayout::from_yaml(
            "date_column: B\ncolumns:\n  - field: date\n    column: C\n"
        )
        .is_err());
    }

    #[test]
    fn example_layout_file_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../config/sheet_layout.example.yaml");
        let layout = SheetLayout::load(&path).unwrap();
        assert_eq!(layout, SheetLayout::default());
    }
}
