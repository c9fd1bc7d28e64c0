// CSV rendering for table and comparison exports
use crate::application::series_store::TagScope;
use crate::domain::comparison::Comparison;
use crate::domain::view::SeriesTable;

const STEP_TITLE: &str = "step";
const COMPARISON_TITLES: [&str; 3] = ["Comparison Normal", "Comparison Absolute", "Comparison Relative"];

pub fn table_csv(table: &SeriesTable) -> Option<String> {
    let header: Vec<String> = std::iter::once(STEP_TITLE.to_string())
        .chain(table.columns.iter().cloned())
        .collect();
    let rows = table.rows.iter().map(|row| {
        std::iter::once(Some(row.step as f64))
            .chain(table.columns.iter().map(|c| row.values.get(c).copied().flatten()))
            .collect::<Vec<_>>()
    });
    render(&header, rows)
}

pub fn comparison_csv(comparison: &Comparison) -> Option<String> {
    let header: Vec<String> = std::iter::once(STEP_TITLE)
        .chain(COMPARISON_TITLES)
        .map(str::to_string)
        .collect();
    let rows = comparison
        .rows
        .iter()
        .map(|row| vec![Some(row.step as f64), row.normal, row.absolute, row.relative]);
    render(&header, rows)
}

/// Header row of titles, then one line per record. Null cells stay empty.
fn render<I>(header: &[String], rows: I) -> Option<String>
where
    I: Iterator<Item = Vec<Option<f64>>>,
{
    let mut rows = rows.peekable();
    if header.is_empty() || rows.peek().is_none() {
        return None;
    }

    let mut out = header.join(",");
    out.push('\n');
    for row in rows {
        let mut line = String::new();
        for cell in row {
            if let Some(value) = cell {
                line.push_str(&value.to_string());
            }
            line.push(',');
        }
        if line.ends_with(',') {
            line.pop();
        }
        out.push_str(&line);
        out.push('\n');
    }
    Some(out)
}

/// `<tag>_<millis>.csv`; multi-tag scopes export as `tagAggregation`.
pub fn export_file_name(scope: &TagScope, comparison: bool) -> String {
    export_file_name_at(scope, comparison, chrono::Utc::now().timestamp_millis())
}

fn export_file_name_at(scope: &TagScope, comparison: bool, millis: i64) -> String {
    let stem = match scope {
        TagScope::One(tag) => tag.as_str(),
        TagScope::Many(_) => "tagAggregation",
    };
    if comparison {
        format!("{}_comparison_{}.csv", stem, millis)
    } else {
        format!("{}_{}.csv", stem, millis)
    }
}
