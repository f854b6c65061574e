use crate::models::{HostProfile, SCRAPED_AT_FORMAT};
use anyhow::{Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::{Local, NaiveDateTime};
use rust_xlsxwriter::{Format, Workbook};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SHEET_NAME: &str = "Perfis";

pub const COLUMNS: [&str; 10] = [
    "source_url",
    "listing_title",
    "host_name",
    "host_profile_url",
    "host_listings_count",
    "rating",
    "review_count",
    "location",
    "joined",
    "scraped_at",
];

/// Per-city workbook of host profiles, unique by `source_url`
///
/// Every append rewrites the whole workbook to a temporary file and renames
/// it over the old one, so the file on disk is always a complete workbook
/// holding every row appended so far.
pub struct ProfileSheet {
    path: PathBuf,
    rows: Vec<HostProfile>,
    urls: HashSet<String>,
}

impl ProfileSheet {
    /// Open the sheet at `path`, loading existing rows if the file exists.
    /// A file we cannot read is moved aside rather than overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let rows = if path.exists() {
            match read_rows(&path) {
                Ok(rows) => {
                    info!(path = %path.display(), rows = rows.len(), "Loaded existing spreadsheet");
                    rows
                }
                Err(e) => {
                    let backup = backup_path(&path);
                    warn!(
                        path = %path.display(),
                        backup = %backup.display(),
                        "Existing spreadsheet is unreadable ({:#}), moving it aside", e
                    );
                    std::fs::rename(&path, &backup).with_context(|| {
                        format!("Failed to move {} aside", path.display())
                    })?;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut sheet = Self {
            path,
            rows: Vec::with_capacity(rows.len()),
            urls: HashSet::new(),
        };
        for row in rows {
            // Keep the first copy if a hand-edited sheet repeats a URL
            if sheet.urls.insert(row.source_url.clone()) {
                sheet.rows.push(row);
            }
        }
        Ok(sheet)
    }

    pub fn rows(&self) -> &[HostProfile] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, source_url: &str) -> bool {
        self.urls.contains(source_url)
    }

    pub fn source_urls(&self) -> &HashSet<String> {
        &self.urls
    }

    /// Append a profile and persist the sheet. Returns false, writing
    /// nothing, when a row for the same listing already exists.
    pub fn append(&mut self, profile: HostProfile) -> Result<bool> {
        if self.urls.contains(&profile.source_url) {
            debug!(url = %profile.source_url, "Row already present, skipping");
            return Ok(false);
        }

        self.urls.insert(profile.source_url.clone());
        self.rows.push(profile);

        if let Err(e) = self.save() {
            // Keep memory in line with disk
            if let Some(row) = self.rows.pop() {
                self.urls.remove(&row.source_url);
            }
            return Err(e);
        }
        Ok(true)
    }

    fn save(&self) -> Result<()> {
        let tmp = self.path.with_extension("xlsx.tmp");

        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        sheet.set_freeze_panes(1, 0)?;

        for (col, name) in COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header)?;
        }
        sheet.set_column_width(0, 45)?;
        sheet.set_column_width(1, 40)?;
        sheet.set_column_width(3, 45)?;

        for (i, profile) in self.rows.iter().enumerate() {
            let row = (i + 1) as u32;
            let text_cells = [
                (0, Some(profile.source_url.clone())),
                (1, profile.listing_title.clone()),
                (2, profile.host_name.clone()),
                (3, profile.host_profile_url.clone()),
                (7, profile.location.clone()),
                (8, profile.joined.clone()),
                (9, profile.scraped_at_text()),
            ];
            for (col, value) in text_cells {
                if let Some(value) = value {
                    sheet.write_string(row, col, value)?;
                }
            }

            let number_cells = [
                (4, profile.host_listings_count.map(f64::from)),
                (5, profile.rating.map(|r| (f64::from(r) * 100.0).round() / 100.0)),
                (6, profile.review_count.map(f64::from)),
            ];
            for (col, value) in number_cells {
                if let Some(value) = value {
                    sheet.write_number(row, col, value)?;
                }
            }
        }

        workbook
            .save(&tmp)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), rows = self.rows.len(), "Spreadsheet saved");
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "perfis".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut backup = path.with_file_name(format!("{}.bak-{}.xlsx", stem, stamp));
    let mut n = 2;
    while backup.exists() {
        backup = path.with_file_name(format!("{}.bak-{}_{}.xlsx", stem, stamp, n));
        n += 1;
    }
    backup
}

/// Rows of the first worksheet, columns located by header name
fn read_rows(path: &Path) -> Result<Vec<HostProfile>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("Workbook has no worksheets")?;
    let range = workbook
        .worksheet_range(&first)
        .with_context(|| format!("Failed to read worksheet {}", first))?;

    let mut rows = range.rows();
    let header: HashMap<String, usize> = match rows.next() {
        Some(cells) => cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| cell_text(c).map(|name| (name, i)))
            .collect(),
        None => return Ok(Vec::new()),
    };

    let url_col = *header
        .get("source_url")
        .context("Spreadsheet has no source_url column")?;
    let col = |name: &str| header.get(name).copied();

    let mut profiles = Vec::new();
    for cells in rows {
        let get = |idx: Option<usize>| idx.and_then(|i| cells.get(i));

        let Some(source_url) = cells.get(url_col).and_then(cell_text) else {
            continue;
        };

        profiles.push(HostProfile {
            source_url,
            listing_title: get(col("listing_title")).and_then(cell_text),
            host_name: get(col("host_name")).and_then(cell_text),
            host_profile_url: get(col("host_profile_url")).and_then(cell_text),
            host_listings_count: get(col("host_listings_count")).and_then(cell_u32),
            rating: get(col("rating")).and_then(cell_f64).map(|r| r as f32),
            review_count: get(col("review_count")).and_then(cell_u32),
            location: get(col("location")).and_then(cell_text),
            joined: get(col("joined")).and_then(cell_text),
            scraped_at: get(col("scraped_at"))
                .and_then(cell_text)
                .and_then(|s| NaiveDateTime::parse_from_str(&s, SCRAPED_AT_FORMAT).ok()),
        });
    }
    Ok(profiles)
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn cell_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn cell_u32(cell: &Data) -> Option<u32> {
    cell_f64(cell)
        .filter(|n| *n >= 0.0 && *n <= u32::MAX as f64)
        .map(|n| n.round() as u32)
}
