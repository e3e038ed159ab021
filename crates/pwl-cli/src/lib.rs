// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use pwl_core::{PwlError, SampleSeries};
use pwl_offline::SegmentStats;
use std::fmt::Write as _;

/// Preferred x column when the input has a header row.
pub const DEFAULT_X_COLUMN: &str = "time_pol";
/// Preferred y column when the input has a header row.
pub const DEFAULT_Y_COLUMN: &str = "basepairs_pol";

const STATS_CSV_HEADER: &str = "Segment,Start Index,End Index,Start X,End X,Slope,Intercept,R2,Duration,Fragment Length,SSR,SST";

/// Rectangular CSV input with an optional header row.
///
/// Cells stay as text until a column is selected, so columns that are never
/// used may hold anything.
#[derive(Clone, Debug, PartialEq)]
pub struct CsvTable {
    headers: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
    width: usize,
}

fn split_cells(row: &str) -> Vec<String> {
    row.split(',').map(|cell| cell.trim().to_string()).collect()
}

fn first_row_looks_like_header(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|cell| !cell.is_empty() && cell.parse::<f64>().is_err())
}

impl CsvTable {
    pub fn parse(raw: &str) -> Result<Self, PwlError> {
        let mut lines = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .peekable();

        let first = lines
            .peek()
            .map(|line| split_cells(line))
            .ok_or_else(|| PwlError::invalid_input("CSV input is empty"))?;
        let width = first.len();
        let headers = if first_row_looks_like_header(&first) {
            lines.next();
            Some(first)
        } else {
            None
        };

        let mut rows = Vec::new();
        for (row_idx, line) in lines.enumerate() {
            let cells = split_cells(line);
            if cells.len() != width {
                return Err(PwlError::invalid_input(format!(
                    "CSV data row {} has {} columns but expected {width}",
                    row_idx + 1,
                    cells.len()
                )));
            }
            rows.push(cells);
        }

        Ok(Self {
            headers,
            rows,
            width,
        })
    }

    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of data rows, header excluded.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Display name of column `index`: the header cell, or `column_<index>`.
    pub fn column_name(&self, index: usize) -> String {
        match &self.headers {
            Some(headers) => headers[index].clone(),
            None => format!("column_{index}"),
        }
    }

    fn find_header(&self, name: &str) -> Option<usize> {
        self.headers
            .as_ref()
            .and_then(|headers| headers.iter().position(|header| header == name))
    }

    /// Resolves a user selector (header name or 0-based index) to a column index.
    pub fn resolve_column(&self, selector: &str) -> Result<usize, PwlError> {
        if let Some(index) = self.find_header(selector) {
            return Ok(index);
        }
        match selector.parse::<usize>() {
            Ok(index) if index < self.width => Ok(index),
            Ok(index) => Err(PwlError::invalid_input(format!(
                "column index {index} is out of range for {} column(s)",
                self.width
            ))),
            Err(_) => Err(PwlError::invalid_input(match self.headers {
                Some(_) => format!("column '{selector}' not found in header row"),
                None => format!("column '{selector}' not found; input has no header row"),
            })),
        }
    }

    /// Column used for x when none is requested.
    pub fn default_x_column(&self) -> usize {
        self.find_header(DEFAULT_X_COLUMN).unwrap_or(0)
    }

    /// Column used for y when none is requested.
    pub fn default_y_column(&self) -> usize {
        self.find_header(DEFAULT_Y_COLUMN)
            .unwrap_or(if self.width > 1 { 1 } else { 0 })
    }

    /// Parses column `index` as numbers, reporting failures against `label`.
    pub fn numeric_column(&self, index: usize, label: &'static str) -> Result<Vec<f64>, PwlError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                row[index]
                    .parse::<f64>()
                    .map_err(|_| PwlError::NonNumericData {
                        column: label,
                        index: row_idx,
                    })
            })
            .collect()
    }
}

/// Columns picked for a fit, by index and display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnChoice {
    pub x_index: usize,
    pub x_name: String,
    pub y_index: usize,
    pub y_name: String,
}

/// Builds a series from the selected (or default) x and y columns.
pub fn series_from_table(
    table: &CsvTable,
    x_selector: Option<&str>,
    y_selector: Option<&str>,
) -> Result<(SampleSeries, ColumnChoice), PwlError> {
    let x_index = match x_selector {
        Some(selector) => table.resolve_column(selector)?,
        None => table.default_x_column(),
    };
    let y_index = match y_selector {
        Some(selector) => table.resolve_column(selector)?,
        None => table.default_y_column(),
    };

    let x = table.numeric_column(x_index, "x")?;
    let y = table.numeric_column(y_index, "y")?;
    let series = SampleSeries::load(x, y)?;

    Ok((
        series,
        ColumnChoice {
            x_index,
            x_name: table.column_name(x_index),
            y_index,
            y_name: table.column_name(y_index),
        },
    ))
}

fn push_number(out: &mut String, value: f64) {
    // Undefined values are written as empty cells.
    if !value.is_nan() {
        let _ = write!(out, "{value}");
    }
}

/// Renders the per-segment table with one row per segment.
pub fn stats_to_csv(stats: &[SegmentStats]) -> String {
    let mut out = String::from(STATS_CSV_HEADER);
    out.push('\n');
    for row in stats {
        let _ = write!(
            out,
            "{},{},{},",
            row.segment, row.start_index, row.end_index
        );
        let numbers = [
            row.start_x,
            row.end_x,
            row.slope,
            row.intercept,
            row.r_squared,
            row.duration,
            row.span,
            row.ssr,
            row.sst,
        ];
        for (idx, &value) in numbers.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            push_number(&mut out, value);
        }
        out.push('\n');
    }
    out
}
