// Series domain models - tags, files and their point sequences
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Algorithm id the backend understands for first-order IIR smoothing.
pub const FIRST_ORDER_IR: &str = "smoothing";

pub const MAX_SMOOTHING_WEIGHT: f64 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub step: i64,
    #[serde(default, deserialize_with = "lenient_value")]
    pub value: Option<f64>,
}

impl DataPoint {
    pub fn new(step: i64, value: f64) -> Self {
        Self {
            step,
            value: Some(value),
        }
    }
}

/// The backend writes NaN/Inf as strings; anything non-finite becomes null.
fn lenient_value<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let value = match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    #[serde(rename = "sampleAlgorithm")]
    pub algorithm: String,
    #[serde(rename = "sampleWeight")]
    pub weight: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            algorithm: String::new(),
            weight: 0.0,
        }
    }
}

impl SmoothingConfig {
    pub fn new(algorithm: impl Into<String>, weight: f64) -> Self {
        let weight = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, MAX_SMOOTHING_WEIGHT)
        };
        Self {
            algorithm: algorithm.into(),
            weight,
        }
    }

    /// Smoothed data is only meaningful with an algorithm and a non-zero weight.
    pub fn is_active(&self) -> bool {
        !self.algorithm.is_empty() && self.weight != 0.0
    }
}

/// One series source inside a tag, keyed by its path.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFile {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub offset: usize,
    pub smoothed: Vec<DataPoint>,
    pub sample_offset: usize,
    pub checked: bool,
}

impl SeriesFile {
    pub fn new(name: impl Into<String>, checked: bool) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
            offset: 0,
            smoothed: Vec::new(),
            sample_offset: 0,
            checked,
        }
    }

    pub fn append_points(&mut self, points: Vec<DataPoint>) {
        self.points.extend(points);
        self.offset = self.points.len();
    }

    pub fn append_smoothed(&mut self, points: Vec<DataPoint>) {
        self.smoothed.extend(points);
        self.sample_offset = self.smoothed.len();
    }

    pub fn clear_smoothed(&mut self) {
        self.smoothed.clear();
        self.sample_offset = 0;
    }
}

/// A metric stream group. Owns its files plus the per-tag selection state.
#[derive(Debug, Clone, Default)]
pub struct TagRecord {
    pub files: IndexMap<String, SeriesFile>,
    pub smoothing: SmoothingConfig,
    /// Checked file paths in the order the user picked them.
    pub show_list: Vec<String>,
    /// The other display mode's selection, restored when the mode flips back.
    pub stashed_show_list: Vec<String>,
}

/// A (tag, file) pick in aggregation mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEntry {
    pub tag: String,
    pub file_path: String,
    pub file_name: String,
}

impl CheckEntry {
    /// Builds an entry whose display name is namespaced by its tag.
    pub fn new(tag: impl Into<String>, file_path: impl Into<String>, name: &str) -> Self {
        let tag = tag.into();
        let file_name = format!("{}:{}", tag, name);
        Self {
            tag,
            file_path: file_path.into(),
            file_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub path: String,
}

/// Files discovered for one tag, as returned by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFiles {
    pub tag: String,
    pub file_list: Vec<FileRef>,
}

/// Newly appeared files under a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFileEntry {
    pub dir: String,
    pub file_list: Vec<String>,
}

/// New points for one (tag, file) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDelta {
    pub tag: String,
    pub file: String,
    #[serde(default)]
    pub points: Vec<DataPoint>,
    #[serde(default)]
    pub sampled_points: Option<Vec<DataPoint>>,
}

/// One entry of the chart-data request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphItem {
    pub tag: String,
    pub file: String,
    pub offset: usize,
    pub sample_offset: usize,
    pub sample_algorithm: String,
    pub sample_weight: f64,
}

/// A chart-data request snapshot, tied to the store epoch it was taken in.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub epoch: u64,
    pub graph_list: Vec<GraphItem>,
}

impl GraphRequest {
    pub fn find(&self, tag: &str, file: &str) -> Option<&GraphItem> {
        self.graph_list
            .iter()
            .find(|item| item.tag == tag && item.file == file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_value_decoding() {
        let points: Vec<DataPoint> = serde_json::from_str(
            r#"[{"step":0,"value":1.5},{"step":1,"value":"nan"},{"step":2,"value":null},{"step":3,"value":"2.25"},{"step":4}]"#,
        )
        .unwrap();

        assert_eq!(points[0].value, Some(1.5));
        assert_eq!(points[1].value, None);
        assert_eq!(points[2].value, None);
        assert_eq!(points[3].value, Some(2.25));
        assert_eq!(points[4].value, None);
    }

    #[test]
    fn test_smoothing_weight_is_clamped() {
        assert_eq!(SmoothingConfig::new(FIRST_ORDER_IR, 1.5).weight, MAX_SMOOTHING_WEIGHT);
        assert_eq!(SmoothingConfig::new(FIRST_ORDER_IR, -0.2).weight, 0.0);
        assert!(!SmoothingConfig::new(FIRST_ORDER_IR, 0.0).is_active());
        assert!(!SmoothingConfig::new("", 0.6).is_active());
        assert!(SmoothingConfig::new(FIRST_ORDER_IR, 0.6).is_active());
    }

    #[test]
    fn test_check_entry_namespaces_display_name() {
        let entry = CheckEntry::new("loss", "run1/events.log", "run1");
        assert_eq!(entry.file_name, "loss:run1");
        assert_eq!(entry.file_path, "run1/events.log");
    }

    #[test]
    fn test_graph_item_wire_names() {
        let item = GraphItem {
            tag: "loss".into(),
            file: "a.log".into(),
            offset: 3,
            sample_offset: 1,
            sample_algorithm: FIRST_ORDER_IR.into(),
            sample_weight: 0.5,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["sampleOffset"], 1);
        assert_eq!(json["sampleAlgorithm"], "smoothing");
        assert_eq!(json["sampleWeight"], 0.5);
    }
}
