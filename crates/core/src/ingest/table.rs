use std::io::Cursor;

use calamine::{Reader, open_workbook_auto_from_rs};

const MAX_CELL_WIDTH: usize = 40;

/// A parsed row/column table, header first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_csv(data: &[u8]) -> Result<Self, String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data);
        let headers = reader
            .headers()
            .map_err(|err| format!("{err}"))?
            .iter()
            .map(ToOwned::to_owned)
            .collect();
        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|record| {
                        record
                            .iter()
                            .map(ToOwned::to_owned)
                            .collect::<Vec<_>>()
                    })
                    .map_err(|err| format!("{err}"))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { headers, rows })
    }

    /// Reads the first worksheet of an Excel or OpenDocument workbook.
    pub fn from_spreadsheet(data: &[u8]) -> Result<Self, String> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec()))
            .map_err(|err| format!("{err}"))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| "the workbook has no worksheets".to_owned())?
            .map_err(|err| format!("{err}"))?;

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>());
        let headers = rows.next().unwrap_or_default();
        Ok(Self {
            headers,
            rows: rows.collect(),
        })
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain([self.headers.len()])
            .max()
            .unwrap_or(0)
    }

    /// Renders the header and the first `limit` rows as a fixed-width
    /// text table with a leading row index. Columns are right-aligned.
    pub fn render_preview(&self, limit: usize) -> String {
        let rows = &self.rows[..self.rows.len().min(limit)];
        let columns = self.column_count();

        let cell = |row: &[String], idx: usize| -> String {
            row.get(idx).map(|s| clip(s)).unwrap_or_default()
        };
        let mut widths = vec![0; columns];
        for (idx, width) in widths.iter_mut().enumerate() {
            *width = std::iter::once(&self.headers[..])
                .chain(rows.iter().map(Vec::as_slice))
                .map(|row| cell(row, idx).chars().count())
                .max()
                .unwrap_or(0);
        }
        let index_width = rows.len().saturating_sub(1).to_string().len();

        let mut out = String::new();
        let mut push_line = |index: &str, row: &[String]| {
            let mut line = format!("{index:>index_width$}");
            for (idx, &width) in widths.iter().enumerate() {
                line.push_str("  ");
                line.push_str(&format!("{:>width$}", cell(row, idx)));
            }
            out.push_str(line.trim_end());
            out.push('\n');
        };
        push_line("", &self.headers);
        for (idx, row) in rows.iter().enumerate() {
            push_line(&idx.to_string(), row);
        }
        out.pop();
        out
    }
}

fn clip(cell: &str) -> String {
    let cell = cell.replace(['\n', '\r', '\t'], " ");
    if cell.chars().count() <= MAX_CELL_WIDTH {
        return cell;
    }
    let mut clipped: String = cell.chars().take(MAX_CELL_WIDTH - 3).collect();
    clipped.push_str("...");
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_csv() {
        let table =
            Table::from_csv(b"name,price\napple,3\n\"pear, green\",42\n").unwrap();
        assert_eq!(table.headers, ["name", "price"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], ["pear, green", "42"]);
    }

    #[test]
    fn test_from_csv_unequal_lengths() {
        let err = Table::from_csv(b"a,b\n1,2\n3,4,5\n").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_from_spreadsheet() {
        let table =
            Table::from_spreadsheet(include_bytes!("../../fixtures/sales.xlsx"))
                .unwrap();
        assert_eq!(table.headers, ["region", "month", "units"]);
        assert_eq!(table.rows.len(), 12);
        assert_eq!(table.rows[0], ["North", "m1", "5"]);
        assert_eq!(table.rows[11], ["South", "m12", "60"]);

        let preview = table.render_preview(10);
        assert_eq!(preview.lines().count(), 11);
        assert!(preview.lines().last().unwrap().contains("m10"));
        assert!(!preview.contains("m11"));
    }

    #[test]
    fn test_from_spreadsheet_rejects_garbage() {
        assert!(Table::from_spreadsheet(b"definitely not a workbook").is_err());
    }

    #[test]
    fn test_render_preview() {
        let table = Table {
            headers: vec!["name".to_owned(), "price".to_owned()],
            rows: vec![
                vec!["apple".to_owned(), "3".to_owned()],
                vec!["kiwi".to_owned(), "42".to_owned()],
                vec!["melon".to_owned(), "7".to_owned()],
            ],
        };
        assert_eq!(
            table.render_preview(10),
            "    name  price\n0  apple      3\n1   kiwi     42\n2  melon      7"
        );
        assert_eq!(
            table.render_preview(1),
            "    name  price\n0  apple      3"
        );
    }

    #[test]
    fn test_render_ragged_and_long_cells() {
        let long = "x".repeat(60);
        let table = Table {
            headers: vec!["a".to_owned()],
            rows: vec![vec![long, "extra".to_owned()]],
        };
        let preview = table.render_preview(10);
        let lines: Vec<_> = preview.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(&format!("{}...", "x".repeat(37))));
        assert!(lines[1].ends_with("extra"));
    }
}
