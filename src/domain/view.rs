// Read-side projections of the series store
use super::series::DataPoint;
use indexmap::IndexMap;
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const SMOOTHING_SUFFIX: &str = "_smoothing";

/// What a chart or table for one tag (or one aggregation) needs to render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesView {
    pub data: IndexMap<String, Vec<DataPoint>>,
    pub columns: Vec<String>,
    pub show_list: Vec<String>,
    pub smoothing_data: IndexMap<String, Vec<DataPoint>>,
    pub smoothing_columns: Vec<String>,
}

impl SeriesView {
    pub fn series(&self, column: &str) -> Option<&[DataPoint]> {
        self.data.get(column).map(Vec::as_slice)
    }

    /// The comparison chart is only shown for exactly two picks.
    pub fn is_comparable(&self) -> bool {
        self.show_list.len() == 2
    }

    pub fn table(&self) -> SeriesTable {
        SeriesTable::build(&self.columns, &self.data)
    }

    pub fn smoothing_table(&self) -> SeriesTable {
        SeriesTable::build(&self.smoothing_columns, &self.smoothing_data)
    }
}

pub fn smoothing_column(name: &str) -> String {
    format!("{}{}", name, SMOOTHING_SUFFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LenInfo {
    pub max: Option<usize>,
    /// Only set when two series are laid side by side.
    pub min: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub step: usize,
    #[serde(flatten)]
    pub values: IndexMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesTable {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
    pub len: LenInfo,
}

impl SeriesTable {
    pub fn build(columns: &[String], data: &IndexMap<String, Vec<DataPoint>>) -> Self {
        let lengths: Vec<usize> = columns
            .iter()
            .map(|c| data.get(c).map_or(0, Vec::len))
            .collect();

        if lengths.is_empty() {
            return Self {
                columns: Vec::new(),
                rows: Vec::new(),
                len: LenInfo {
                    max: None,
                    min: None,
                },
            };
        }

        let max = lengths.iter().copied().max().unwrap_or(0);
        let min = if lengths.len() == 2 {
            lengths.iter().copied().min()
        } else {
            None
        };

        let rows = (0..max)
            .map(|i| {
                let values = columns
                    .iter()
                    .map(|c| {
                        let value = data.get(c).and_then(|s| s.get(i)).and_then(|p| p.value);
                        (c.clone(), value)
                    })
                    .collect();
                TableRow { step: i, values }
            })
            .collect();

        Self {
            columns: columns.to_vec(),
            rows,
            len: LenInfo {
                max: Some(max),
                min,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub items: Vec<T>,
}

/// 1-based pagination; out-of-range pages come back empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    };
    let start = (page - 1).saturating_mul(page_size);
    let slice = items.iter().skip(start).take(page_size).cloned().collect();
    Page {
        total: items.len(),
        page,
        page_size,
        items: slice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<DataPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DataPoint::new(i as i64, *v))
            .collect()
    }

    #[test]
    fn test_table_pads_shorter_series_with_null() {
        let mut data = IndexMap::new();
        data.insert("a".to_string(), series(&[1.0, 2.0, 3.0]));
        data.insert("b".to_string(), series(&[4.0]));
        let columns = vec!["a".to_string(), "b".to_string()];

        let table = SeriesTable::build(&columns, &data);

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.len, LenInfo { max: Some(3), min: Some(1) });
        assert_eq!(table.rows[0].values["b"], Some(4.0));
        assert_eq!(table.rows[2].values["b"], None);
        assert_eq!(table.rows[2].step, 2);
    }

    #[test]
    fn test_single_series_has_no_min() {
        let mut data = IndexMap::new();
        data.insert("a".to_string(), series(&[1.0, 2.0]));
        let table = SeriesTable::build(&["a".to_string()], &data);
        assert_eq!(table.len, LenInfo { max: Some(2), min: None });
    }

    #[test]
    fn test_empty_table() {
        let table = SeriesTable::build(&[], &IndexMap::new());
        assert!(table.rows.is_empty());
        assert_eq!(table.len.max, None);
    }

    #[test]
    fn test_paginate() {
        let items: Vec<usize> = (0..45).collect();

        let first = paginate(&items, 1, DEFAULT_PAGE_SIZE);
        assert_eq!(first.items.len(), 20);
        assert_eq!(first.total, 45);

        let last = paginate(&items, 3, DEFAULT_PAGE_SIZE);
        assert_eq!(last.items, (40..45).collect::<Vec<_>>());

        assert!(paginate(&items, 9, 20).items.is_empty());
        assert_eq!(paginate(&items, 0, 0).page_size, DEFAULT_PAGE_SIZE);
    }
}
