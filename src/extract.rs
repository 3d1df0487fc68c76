//! Line-oriented document extraction.
//!
//! A document is read once and scanned line by line. The scanner moves between four states:
//!
//! - `Start`: only the very first line may open a metadata block (`---` for YAML, `+++` for TOML).
//! - `Metadata`: lines are buffered until the matching closing fence.
//! - `Body`: lines become content; link-like lines are matched for outlinks and attachments.
//! - `Excluded`: inside an `<!--exc:start-->` ... `<!--exc:end-->` region.
//!
//! Exclusion markers only act when the extractor restricts output to public documents. Excluded
//! lines are dropped before link scanning, so links inside them are never indexed in that mode.
//! Switching modes therefore requires a full re-extraction rather than a patch.
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::Metadata,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use crate::{
    config::CoreConfig,
    document::{Document, MetaValue},
    error::VellumError,
    paths::{abs_from_doc_path, has_extension, normalize_link},
};

pub const EXCLUDE_LINE: &str = "<!--exc-->";
pub const EXCLUDE_START: &str = "<!--exc:start-->";
pub const EXCLUDE_END: &str = "<!--exc:end-->";

/// `[text](target)`, `![alt](target "title")` and `[text](<target with spaces>)`.
static INLINE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[[^\]]*\]\(\s*(<[^>]*>|[^)\s]+)(?:\s+(?:"[^"]*"|'[^']*'))?\s*\)"#)
        .expect("inline link pattern is valid")
});

/// `src="target"` or `src='target'` on embedded resources.
static EMBED_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"src\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("embed pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Metadata, content, outlinks and attachments.
    Full,
    /// Metadata and content only; link scanning is skipped.
    ContentOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Yaml,
    Toml,
}

impl BlockKind {
    fn open(line: &str) -> Option<BlockKind> {
        match line.trim_end() {
            "---" => Some(BlockKind::Yaml),
            "+++" => Some(BlockKind::Toml),
            _ => None,
        }
    }

    fn fence(&self) -> &'static str {
        match self {
            BlockKind::Yaml => "---",
            BlockKind::Toml => "+++",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Start,
    Metadata(BlockKind),
    Body,
    Excluded,
}

#[derive(Debug, Default)]
struct Scan<'a> {
    metadata: Option<(BlockKind, Vec<&'a str>)>,
    body: Vec<&'a str>,
    heading: Option<&'a str>,
    targets: BTreeSet<String>,
}

impl<'a> Scan<'a> {
    fn body_line(&mut self, line: &'a str, scan_links: bool) {
        if self.heading.is_none() {
            if let Some(heading) = line.strip_prefix("# ") {
                let heading = heading.trim();
                if !heading.is_empty() {
                    self.heading = Some(heading);
                }
            }
        }
        if scan_links && (line.contains("](") || line.contains("src=")) {
            for cap in INLINE_LINK.captures_iter(line) {
                self.push_target(&cap[1]);
            }
            for cap in EMBED_SRC.captures_iter(line) {
                if let Some(target) = cap.get(1).or_else(|| cap.get(2)) {
                    self.push_target(target.as_str());
                }
            }
        }
        self.body.push(line);
    }

    fn push_target(&mut self, raw: &str) {
        if let Some(target) = normalize_link(raw) {
            self.targets.insert(target);
        }
    }
}

/// Parses documents under one content root. Cheap to clone; holds no open resources.
#[derive(Debug, Clone)]
pub struct Extractor {
    root: PathBuf,
    only_public: bool,
    extension: String,
}

impl Extractor {
    pub fn new<P: AsRef<Path>>(root: P, only_public: bool, extension: &str) -> Self {
        Extractor {
            root: root.as_ref().to_path_buf(),
            only_public,
            extension: extension.to_string(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Extractor::new(
            &config.content_root,
            config.only_public,
            &config.document_extension,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn only_public(&self) -> bool {
        self.only_public
    }

    /// Read and parse the document at `doc_path` (rooted, e.g. `/notes/a.md`).
    pub fn extract(&self, doc_path: &str, mode: ExtractMode) -> Result<Document, VellumError> {
        let abs = abs_from_doc_path(&self.root, doc_path);
        let with_path = |e: std::io::Error| match VellumError::from(e) {
            VellumError::NotFound(_) => VellumError::NotFound(doc_path.to_string()),
            VellumError::Io(msg) => VellumError::Io(format!("{doc_path}: {msg}")),
            other => other,
        };
        let meta = std::fs::metadata(&abs).map_err(with_path)?;
        let text = std::fs::read_to_string(&abs).map_err(with_path)?;
        let mut doc = self.extract_str(doc_path, &text, mode)?;
        doc.mtime = mtime_secs(&meta);
        Ok(doc)
    }

    /// Parse already-read text. Performs no I/O; `mtime` is left at zero.
    pub fn extract_str(
        &self,
        doc_path: &str,
        text: &str,
        mode: ExtractMode,
    ) -> Result<Document, VellumError> {
        let scan = self.scan(doc_path, text, mode == ExtractMode::Full)?;
        let mut doc = Document::new(doc_path);
        if let Some(heading) = scan.heading {
            doc.title = heading.to_string();
        }
        if let Some((kind, lines)) = &scan.metadata {
            let fields = parse_block(doc_path, *kind, &lines.join("\n"))?;
            apply_metadata(doc_path, &mut doc, fields)?;
        }
        for target in scan.targets {
            if has_extension(&target, &self.extension) {
                doc.outlinks.insert(target);
            } else {
                doc.attachments.insert(target);
            }
        }
        doc.content = scan.body.join("\n").trim_end_matches('\n').to_string();
        Ok(doc)
    }

    fn scan<'a>(
        &self,
        doc_path: &str,
        text: &'a str,
        scan_links: bool,
    ) -> Result<Scan<'a>, VellumError> {
        let mut scan = Scan::default();
        let mut state = ScanState::Start;
        for line in text.lines() {
            state = match state {
                ScanState::Start => match BlockKind::open(line) {
                    Some(kind) => {
                        scan.metadata = Some((kind, Vec::new()));
                        ScanState::Metadata(kind)
                    }
                    None => self.body_state(&mut scan, line, scan_links),
                },
                ScanState::Metadata(kind) => {
                    if line.trim_end() == kind.fence() {
                        ScanState::Body
                    } else {
                        if let Some((_, lines)) = scan.metadata.as_mut() {
                            lines.push(line);
                        }
                        ScanState::Metadata(kind)
                    }
                }
                ScanState::Body => self.body_state(&mut scan, line, scan_links),
                ScanState::Excluded => {
                    if line.contains(EXCLUDE_END) {
                        ScanState::Body
                    } else {
                        ScanState::Excluded
                    }
                }
            };
        }
        if let ScanState::Metadata(kind) = state {
            return Err(VellumError::parse(
                doc_path,
                format!("unterminated metadata block, expected closing '{}'", kind.fence()),
            ));
        }
        Ok(scan)
    }

    fn body_state<'a>(&self, scan: &mut Scan<'a>, line: &'a str, scan_links: bool) -> ScanState {
        if self.only_public {
            if line.contains(EXCLUDE_START) {
                return if line.contains(EXCLUDE_END) {
                    ScanState::Body
                } else {
                    ScanState::Excluded
                };
            }
            if line.contains(EXCLUDE_LINE) {
                return ScanState::Body;
            }
        }
        scan.body_line(line, scan_links);
        ScanState::Body
    }
}

pub fn mtime_secs(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn parse_block(doc_path: &str, kind: BlockKind, raw: &str) -> Result<Map<String, Value>, VellumError> {
    let value = match kind {
        BlockKind::Yaml => {
            if raw.trim().is_empty() {
                return Ok(Map::new());
            }
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(raw).map_err(|e| VellumError::parse(doc_path, e))?;
            serde_json::to_value(&yaml).map_err(|e| VellumError::parse(doc_path, e))?
        }
        BlockKind::Toml => {
            let table: toml::Table =
                toml::from_str(raw).map_err(|e| VellumError::parse(doc_path, e))?;
            toml_to_json(toml::Value::Table(table))
        }
    };
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(VellumError::parse(
            doc_path,
            format!("metadata block must be a mapping, found {other}"),
        )),
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn apply_metadata(
    doc_path: &str,
    doc: &mut Document,
    mut fields: Map<String, Value>,
) -> Result<(), VellumError> {
    if let Some(title) = fields.remove("title").as_ref().and_then(scalar_text) {
        if !title.trim().is_empty() {
            doc.title = title.trim().to_string();
        }
    }
    doc.public = matches!(fields.remove("public"), Some(Value::Bool(true)));
    match fields.remove("date") {
        None | Some(Value::Null) => {}
        Some(Value::String(raw)) => {
            doc.date = Some(parse_date(&raw).ok_or_else(|| {
                VellumError::parse(doc_path, format!("unrecognized date '{raw}'"))
            })?);
        }
        Some(other) => {
            return Err(VellumError::parse(
                doc_path,
                format!("date must be a timestamp string, found {other}"),
            ))
        }
    }
    doc.tags = match fields.remove("tags") {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(&other).into_iter().collect(),
        None => BTreeSet::new(),
    };
    doc.tags.retain(|t| !t.trim().is_empty());

    let mut metadata = BTreeMap::new();
    for (key, value) in fields {
        let meta = match value {
            Value::Null => continue,
            Value::Array(items) => MetaValue::List(items.iter().filter_map(scalar_text).collect()),
            other => match scalar_text(&other) {
                Some(text) => MetaValue::String(text),
                None => continue,
            },
        };
        metadata.insert(key, meta);
    }
    doc.metadata = metadata;
    Ok(())
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DDTHH:MM:SS[.fff]` and bare
/// `YYYY-MM-DD` (midnight UTC). Naive times are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // `%.f` also accepts a missing fraction.
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
