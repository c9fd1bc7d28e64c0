// Series store - Owns every (tag, file) series and the selection state around it
use crate::domain::series::{
    CheckEntry, GraphItem, GraphRequest, NewFileEntry, SeriesDelta, SeriesFile, SmoothingConfig,
    TagFiles, TagRecord,
};
use crate::domain::view::{smoothing_column, SeriesView};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Checked files per tag, and picks per aggregation view.
pub const MAX_CHECKED: usize = 2;
/// Tags auto-selected for display as they are discovered.
pub const MAX_AUTO_SHOWN_TAGS: usize = 3;
pub const DEFAULT_STEP_SECS: u64 = 5;
pub const STEP_SECS_RANGE: RangeInclusive<u64> = 1..=10;

/// Change counters observed by the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreVersion {
    /// Bumped when the tag/file catalogue changes.
    pub files: u64,
    /// Bumped when points are appended.
    pub data: u64,
    /// Bumped on selection, display mode and smoothing changes.
    pub settings: u64,
    /// Bumped on every full reset.
    pub epoch: u64,
}

/// One tag or several tags viewed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagScope {
    One(String),
    Many(Vec<String>),
}

impl TagScope {
    pub fn tags(&self) -> Vec<&str> {
        match self {
            TagScope::One(tag) => vec![tag.as_str()],
            TagScope::Many(tags) => tags.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for TagScope {
    fn from(tag: &str) -> Self {
        TagScope::One(tag.to_string())
    }
}

impl From<String> for TagScope {
    fn from(tag: String) -> Self {
        TagScope::One(tag)
    }
}

impl From<Vec<String>> for TagScope {
    fn from(tags: Vec<String>) -> Self {
        TagScope::Many(tags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Tag {
        tag: String,
        #[serde(rename = "fileList")]
        files: Vec<String>,
    },
    Aggregate(Vec<CheckEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FileModel {
    #[serde(rename = "isChecked")]
    Checked,
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "offset")]
    Offset,
    #[serde(rename = "sampleOffset")]
    SampleOffset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FileModelValue {
    Flag(bool),
    Count(usize),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListEntry {
    pub file_path: String,
    pub file_name: String,
    pub value: FileModelValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileListResult {
    pub tag: String,
    pub file: Vec<FileListEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct SeriesStore {
    tags: IndexMap<String, TagRecord>,
    show_tags: Vec<String>,
    aggregation: Vec<CheckEntry>,
    polymerize: bool,
    step_secs: u64,
    default_step_secs: u64,
    new_files: Vec<NewFileEntry>,
    version: StoreVersion,
    notifier: watch::Sender<StoreVersion>,
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::with_default_step(DEFAULT_STEP_SECS)
    }

    /// A store whose poll step starts at (and resets to) `secs`, clamped.
    pub fn with_default_step(secs: u64) -> Self {
        let step_secs = clamp_step(secs);
        let version = StoreVersion::default();
        let (notifier, _) = watch::channel(version);
        Self {
            tags: IndexMap::new(),
            show_tags: Vec::new(),
            aggregation: Vec::new(),
            polymerize: false,
            step_secs,
            default_step_secs: step_secs,
            new_files: Vec::new(),
            version,
            notifier,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreVersion> {
        self.notifier.subscribe()
    }

    pub fn version(&self) -> StoreVersion {
        self.version
    }

    pub fn epoch(&self) -> u64 {
        self.version.epoch
    }

    fn bump(&mut self, change: impl FnOnce(&mut StoreVersion)) {
        change(&mut self.version);
        self.notifier.send_replace(self.version);
    }

    /// Registers unseen (tag, file) pairs. The first file of a tag is checked
    /// and the tag shown while fewer than three tags are. In aggregation mode
    /// that pick is only stashed for the per-tag view.
    pub fn add_file(&mut self, groups: &[TagFiles]) {
        let polymerize = self.polymerize;
        for group in groups {
            let record = self.tags.entry(group.tag.clone()).or_default();
            for file in &group.file_list {
                if record.files.contains_key(&file.path) {
                    continue;
                }
                let first = record.files.is_empty();
                record.files.insert(
                    file.path.clone(),
                    SeriesFile::new(file.name.clone(), first && !polymerize),
                );
                if first {
                    if !polymerize {
                        record.show_list = vec![file.path.clone()];
                    }
                    record.stashed_show_list = vec![file.path.clone()];
                    if self.show_tags.len() < MAX_AUTO_SHOWN_TAGS
                        && !self.show_tags.contains(&group.tag)
                    {
                        self.show_tags.push(group.tag.clone());
                    }
                }
            }
        }
        tracing::debug!("Store now tracks {} tags", self.tags.len());
        self.bump(|v| v.files += 1);
    }

    /// Appends fetched points. A delta is merged only when it was requested in
    /// the current epoch from the offset the file still sits at; raw and
    /// smoothed sequences are checked independently.
    pub fn add_data(&mut self, request: &GraphRequest, deltas: Vec<SeriesDelta>) -> MergeReport {
        let mut report = MergeReport::default();

        if request.epoch != self.version.epoch {
            tracing::debug!(
                "Dropping {} deltas from epoch {} (store is at {})",
                deltas.len(),
                request.epoch,
                self.version.epoch
            );
            report.skipped = deltas.len();
            return report;
        }

        for delta in deltas {
            let Some(item) = request.find(&delta.tag, &delta.file) else {
                tracing::warn!("Unrequested delta for {}:{}", delta.tag, delta.file);
                report.skipped += 1;
                continue;
            };
            let Some(record) = self.tags.get_mut(&delta.tag) else {
                tracing::warn!("Delta for unknown tag {}", delta.tag);
                report.skipped += 1;
                continue;
            };
            let smoothing_unchanged = record.smoothing.algorithm == item.sample_algorithm
                && record.smoothing.weight == item.sample_weight;
            let Some(file) = record.files.get_mut(&delta.file) else {
                tracing::warn!("Delta for unknown file {}:{}", delta.tag, delta.file);
                report.skipped += 1;
                continue;
            };

            let mut merged = false;
            if file.offset == item.offset {
                file.append_points(delta.points);
                merged = true;
            } else {
                tracing::warn!(
                    "Raw offset moved for {}:{} (requested {}, now {})",
                    delta.tag,
                    delta.file,
                    item.offset,
                    file.offset
                );
            }

            if let Some(sampled) = delta.sampled_points {
                if smoothing_unchanged && file.sample_offset == item.sample_offset {
                    file.append_smoothed(sampled);
                    merged = true;
                } else {
                    tracing::debug!(
                        "Discarding stale smoothed points for {}:{}",
                        delta.tag,
                        delta.file
                    );
                }
            }

            if merged {
                report.applied += 1;
            } else {
                report.skipped += 1;
            }
        }

        if report.applied > 0 {
            self.bump(|v| v.data += 1);
        }
        report
    }

    pub fn modify_check(&mut self, selection: Selection) {
        match selection {
            Selection::Tag { tag, files } => {
                let files = keep_latest(dedup(files));
                self.apply_tag_check(&tag, files);
            }
            Selection::Aggregate(entries) => {
                let entries = keep_latest(dedup(entries));
                self.clear_checks();
                let mut by_tag: IndexMap<String, Vec<String>> = IndexMap::new();
                for entry in &entries {
                    by_tag
                        .entry(entry.tag.clone())
                        .or_default()
                        .push(entry.file_path.clone());
                }
                for (tag, files) in by_tag {
                    self.apply_tag_check(&tag, files);
                }
                self.aggregation = entries;
            }
        }
        self.bump(|v| v.settings += 1);
    }

    fn apply_tag_check(&mut self, tag: &str, files: Vec<String>) {
        let Some(record) = self.tags.get_mut(tag) else {
            tracing::warn!("Cannot check files of unknown tag {}", tag);
            return;
        };
        let files: Vec<String> = files
            .into_iter()
            .filter(|path| record.files.contains_key(path))
            .collect();
        for (path, file) in record.files.iter_mut() {
            file.checked = files.contains(path);
        }
        record.show_list = files;
    }

    fn clear_checks(&mut self) {
        for record in self.tags.values_mut() {
            for file in record.files.values_mut() {
                file.checked = false;
            }
            record.show_list.clear();
        }
    }

    /// Switches between per-tag and aggregation display. Each mode's picks are
    /// stashed while the other is active and restored on the way back.
    pub fn modify_is_tag_polymerize(&mut self, enabled: bool) {
        if self.polymerize == enabled {
            return;
        }
        for record in self.tags.values_mut() {
            std::mem::swap(&mut record.show_list, &mut record.stashed_show_list);
            let show_list = &record.show_list;
            for (path, file) in record.files.iter_mut() {
                file.checked = show_list.contains(path);
            }
        }
        self.polymerize = enabled;
        self.bump(|v| v.settings += 1);
    }

    /// Sets smoothing for each tag in scope and drops its cached smoothed
    /// points so the next poll fetches them again from zero.
    pub fn modify_smoothing_config(&mut self, scope: &TagScope, config: SmoothingConfig) {
        for tag in scope.tags() {
            let Some(record) = self.tags.get_mut(tag) else {
                tracing::warn!("Cannot set smoothing for unknown tag {}", tag);
                continue;
            };
            record.smoothing = config.clone();
            for file in record.files.values_mut() {
                file.clear_smoothed();
            }
        }
        self.bump(|v| v.settings += 1);
    }

    pub fn modify_show_tag_list(&mut self, tags: Vec<String>) {
        let tags: Vec<String> = dedup(tags)
            .into_iter()
            .filter(|tag| self.tags.contains_key(tag))
            .collect();
        self.show_tags = tags;
        self.bump(|v| v.settings += 1);
    }

    pub fn modify_step(&mut self, secs: u64) -> u64 {
        self.step_secs = clamp_step(secs);
        self.bump(|v| v.settings += 1);
        self.step_secs
    }

    pub fn modify_new_file_list(&mut self, entries: Vec<NewFileEntry>) {
        self.new_files = entries;
        self.bump(|v| v.files += 1);
    }

    pub fn get_data_by_tag(&self, scope: &TagScope) -> SeriesView {
        match scope {
            TagScope::One(tag) => self.view_for_tag(tag),
            TagScope::Many(tags) => self.view_for_tags(tags),
        }
    }

    fn view_for_tag(&self, tag: &str) -> SeriesView {
        let Some(record) = self.tags.get(tag) else {
            return SeriesView::default();
        };
        let smoothing_active = record.smoothing.is_active();

        let mut view = SeriesView::default();
        for file in record.files.values().filter(|f| f.checked) {
            view.data.insert(file.name.clone(), file.points.clone());
            let smoothed = if smoothing_active {
                file.smoothed.clone()
            } else {
                file.points.clone()
            };
            view.smoothing_data
                .insert(smoothing_column(&file.name), smoothed);
        }

        view.columns = record
            .show_list
            .iter()
            .filter_map(|path| record.files.get(path))
            .map(|file| file.name.clone())
            .collect();
        view.smoothing_columns = view.columns.iter().map(|c| smoothing_column(c)).collect();
        view.show_list = record.show_list.clone();
        view
    }

    fn view_for_tags(&self, tags: &[String]) -> SeriesView {
        let mut view = SeriesView::default();
        for tag in tags {
            let one = self.view_for_tag(tag);
            for (name, points) in one.data {
                let smoothed = one
                    .smoothing_data
                    .get(&smoothing_column(&name))
                    .cloned()
                    .unwrap_or_default();
                let key = format!("{}:{}", tag, name);
                view.smoothing_data.insert(smoothing_column(&key), smoothed);
                view.data.insert(key, points);
            }
        }
        for entry in &self.aggregation {
            view.columns.push(entry.file_name.clone());
            view.show_list
                .push(format!("{}:{}", entry.tag, entry.file_path));
        }
        view.smoothing_columns = view.columns.iter().map(|c| smoothing_column(c)).collect();
        view
    }

    /// The next chart-data request: every checked file of every shown tag,
    /// from its current offsets.
    pub fn get_graph_list(&self) -> GraphRequest {
        let mut graph_list = Vec::new();
        for (tag, record) in &self.tags {
            if !self.show_tags.contains(tag) {
                continue;
            }
            for (path, file) in record.files.iter().filter(|(_, f)| f.checked) {
                graph_list.push(GraphItem {
                    tag: tag.clone(),
                    file: path.clone(),
                    offset: file.offset,
                    sample_offset: file.sample_offset,
                    sample_algorithm: record.smoothing.algorithm.clone(),
                    sample_weight: record.smoothing.weight,
                });
            }
        }
        GraphRequest {
            epoch: self.version.epoch,
            graph_list,
        }
    }

    pub fn get_tag_list(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    pub fn get_file_list_by_model(&self, model: FileModel) -> Vec<FileListResult> {
        self.tags
            .iter()
            .map(|(tag, record)| FileListResult {
                tag: tag.clone(),
                file: record
                    .files
                    .iter()
                    .map(|(path, file)| FileListEntry {
                        file_path: path.clone(),
                        file_name: file.name.clone(),
                        value: match model {
                            FileModel::Checked => FileModelValue::Flag(file.checked),
                            FileModel::Name => FileModelValue::Text(file.name.clone()),
                            FileModel::Offset => FileModelValue::Count(file.offset),
                            FileModel::SampleOffset => FileModelValue::Count(file.sample_offset),
                        },
                    })
                    .collect(),
            })
            .collect()
    }

    /// A multi-tag scope reports its first tag's configuration.
    pub fn get_smoothing_config(&self, scope: &TagScope) -> Option<SmoothingConfig> {
        let tag = scope.tags().into_iter().next()?;
        self.tags.get(tag).map(|record| record.smoothing.clone())
    }

    pub fn get_show_list(&self, scope: &TagScope) -> Vec<String> {
        scope
            .tags()
            .into_iter()
            .filter_map(|tag| self.tags.get(tag))
            .flat_map(|record| record.show_list.iter().cloned())
            .collect()
    }

    /// Every file of the given tags as an aggregation pick, in tag order.
    pub fn aggregation_candidates(&self, tags: &[String]) -> Vec<CheckEntry> {
        tags.iter()
            .filter_map(|tag| self.tags.get(tag).map(|record| (tag, record)))
            .flat_map(|(tag, record)| {
                record
                    .files
                    .iter()
                    .map(move |(path, file)| CheckEntry::new(tag.clone(), path.clone(), &file.name))
            })
            .collect()
    }

    /// The first picks an aggregation view starts with: currently checked
    /// candidates, capped at two.
    pub fn aggregation_defaults(&self, tags: &[String]) -> Vec<CheckEntry> {
        self.aggregation_candidates(tags)
            .into_iter()
            .filter(|entry| {
                self.tags
                    .get(&entry.tag)
                    .and_then(|record| record.files.get(&entry.file_path))
                    .is_some_and(|file| file.checked)
            })
            .take(MAX_CHECKED)
            .collect()
    }

    pub fn is_tag_polymerize(&self) -> bool {
        self.polymerize
    }

    pub fn show_tag_list(&self) -> &[String] {
        &self.show_tags
    }

    pub fn aggregation_list(&self) -> &[CheckEntry] {
        &self.aggregation
    }

    pub fn step_secs(&self) -> u64 {
        self.step_secs
    }

    pub fn new_file_list(&self) -> &[NewFileEntry] {
        &self.new_files
    }

    pub fn file(&self, tag: &str, path: &str) -> Option<&SeriesFile> {
        self.tags.get(tag).and_then(|record| record.files.get(path))
    }

    /// Back to the initial empty state. Requests taken before this call are
    /// rejected by `add_data`.
    pub fn clear_file_list(&mut self) {
        self.tags.clear();
        self.show_tags.clear();
        self.aggregation.clear();
        self.polymerize = false;
        self.step_secs = self.default_step_secs;
        self.new_files.clear();
        self.bump(|v| {
            v.files += 1;
            v.epoch += 1;
        });
    }
}

fn clamp_step(secs: u64) -> u64 {
    secs.clamp(*STEP_SECS_RANGE.start(), *STEP_SECS_RANGE.end())
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// FIFO eviction: only the last `MAX_CHECKED` picks survive.
fn keep_latest<T>(mut items: Vec<T>) -> Vec<T> {
    if items.len() > MAX_CHECKED {
        let excess = items.len() - MAX_CHECKED;
        items.drain(..excess);
    }
    items
}

/// The store behind a lock. Every mutation runs to completion under it.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<Mutex<SeriesStore>>);

impl SharedStore {
    pub fn new(store: SeriesStore) -> Self {
        Self(Arc::new(Mutex::new(store)))
    }

    pub fn lock(&self) -> MutexGuard<'_, SeriesStore> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
