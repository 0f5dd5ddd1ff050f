//! Maps a file's patch text onto GitHub line numbers.
//!
//! A [`DiffLineMap`] keeps one [`DiffRow`] per rendered patch line, hunk
//! headers included, so callers can both anchor inline comments (`line` +
//! `side`) and find the row to scroll to when showing a target line.

use serde::Serialize;

use crate::core::diff_parser::DiffParser;
use crate::github::types::Side;

/// How far an AI-provided line may be moved onto a commentable line.
pub const MAX_SNAP_DISTANCE: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowKind {
    HunkHeader,
    Added,
    Removed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRow {
    pub index: usize,
    pub kind: RowKind,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
    /// GitHub's legacy diff position; `None` for the first hunk header.
    pub position: Option<u32>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineAnchor {
    pub line: u32,
    pub side: Side,
}

#[derive(Debug, Clone)]
struct HunkSpan {
    new_start: u32,
    new_end: u32,
    first_row: usize,
    last_row: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DiffLineMap {
    rows: Vec<DiffRow>,
    hunks: Vec<HunkSpan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffWindow {
    pub target_row: usize,
    pub rows: Vec<DiffRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWindow {
    /// 1-based line actually targeted after clamping.
    pub target: usize,
    pub clamped: bool,
    pub lines: Vec<(usize, String)>,
}

impl DiffLineMap {
    pub fn from_patch(patch: &str) -> Self {
        let mut map = Self::default();
        let mut old_line = 0u32;
        let mut new_line = 0u32;
        let mut position = 0u32;
        let mut in_hunk = false;
        let mut seen_header = false;

        for raw in patch.lines() {
            if raw.starts_with("@@") {
                if seen_header {
                    position += 1;
                }
                match DiffParser::parse_hunk_header(raw) {
                    Some((old_start, _, new_start, new_lines)) => {
                        old_line = old_start as u32;
                        new_line = new_start as u32;
                        in_hunk = true;
                        map.close_hunk();
                        map.hunks.push(HunkSpan {
                            new_start: new_start as u32,
                            new_end: (new_start + new_lines).saturating_sub(1) as u32,
                            first_row: map.rows.len(),
                            last_row: map.rows.len(),
                        });
                        map.push_row(
                            RowKind::HunkHeader,
                            None,
                            None,
                            seen_header.then_some(position),
                            raw,
                        );
                        seen_header = true;
                    }
                    None => in_hunk = false,
                }
                continue;
            }

            if !in_hunk {
                continue;
            }
            position += 1;

            if raw.starts_with('\\') {
                continue;
            }

            let (kind, text) = match raw.chars().next() {
                Some('+') => (RowKind::Added, &raw[1..]),
                Some('-') => (RowKind::Removed, &raw[1..]),
                Some(' ') => (RowKind::Context, &raw[1..]),
                _ => (RowKind::Context, raw),
            };

            match kind {
                RowKind::Added => {
                    map.push_row(kind, None, Some(new_line), Some(position), text);
                    new_line += 1;
                }
                RowKind::Removed => {
                    map.push_row(kind, Some(old_line), None, Some(position), text);
                    old_line += 1;
                }
                _ => {
                    map.push_row(kind, Some(old_line), Some(new_line), Some(position), text);
                    old_line += 1;
                    new_line += 1;
                }
            }
        }
        map.close_hunk();

        map
    }

    fn push_row(
        &mut self,
        kind: RowKind,
        old_line: Option<u32>,
        new_line: Option<u32>,
        position: Option<u32>,
        text: &str,
    ) {
        self.rows.push(DiffRow {
            index: self.rows.len(),
            kind,
            old_line,
            new_line,
            position,
            text: text.to_string(),
        });
    }

    fn close_hunk(&mut self) {
        if let Some(last) = self.hunks.last_mut() {
            last.last_row = self.rows.len().saturating_sub(1).max(last.first_row);
        }
    }

    pub fn rows(&self) -> &[DiffRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn right_row(&self, line: u32) -> Option<&DiffRow> {
        self.rows.iter().find(|row| row.new_line == Some(line))
    }

    fn left_row(&self, line: u32) -> Option<&DiffRow> {
        self.rows
            .iter()
            .find(|row| row.kind == RowKind::Removed && row.old_line == Some(line))
    }

    /// Exact anchor: a new-file line on the right side, else a removed line on the left.
    pub fn anchor_for(&self, line: u32) -> Option<LineAnchor> {
        if self.right_row(line).is_some() {
            return Some(LineAnchor { line, side: Side::Right });
        }
        self.left_row(line).map(|_| LineAnchor { line, side: Side::Left })
    }

    /// Best-effort anchor for a line reported by a reviewer that may be slightly off.
    pub fn nearest_anchor(&self, line: u32) -> Option<LineAnchor> {
        if let Some(exact) = self.anchor_for(line) {
            return Some(exact);
        }

        let closest = |rows: &[DiffRow], limit: Option<u32>| {
            rows.iter()
                .filter_map(|row| row.new_line)
                .map(|candidate| (candidate.abs_diff(line), candidate))
                .filter(|(distance, _)| limit.map_or(true, |max| *distance <= max))
                .min()
                .map(|(_, candidate)| candidate)
        };

        if let Some(span) = self
            .hunks
            .iter()
            .find(|span| span.new_start <= line && line <= span.new_end)
        {
            if let Some(found) = closest(&self.rows[span.first_row..=span.last_row], None) {
                return Some(LineAnchor { line: found, side: Side::Right });
            }
        }

        closest(&self.rows, Some(MAX_SNAP_DISTANCE))
            .map(|found| LineAnchor { line: found, side: Side::Right })
    }

    pub fn position_for(&self, line: u32) -> Option<u32> {
        self.right_row(line).and_then(|row| row.position)
    }

    pub fn row_for_new_line(&self, line: u32) -> Option<usize> {
        self.right_row(line).map(|row| row.index)
    }

    pub fn row_for_old_line(&self, line: u32) -> Option<usize> {
        self.rows
            .iter()
            .find(|row| row.old_line == Some(line))
            .map(|row| row.index)
    }

    pub fn commentable_lines(&self) -> Vec<u32> {
        self.rows.iter().filter_map(|row| row.new_line).collect()
    }

    /// Rows around the target line, for scrolling a rendered diff.
    pub fn locate(&self, line: u32, side: Side, context: usize) -> Option<DiffWindow> {
        let target_row = match side {
            Side::Right => self.row_for_new_line(line),
            Side::Left => self.row_for_old_line(line),
        }?;
        let start = target_row.saturating_sub(context);
        let end = target_row.saturating_add(context).min(self.rows.len() - 1);

        Some(DiffWindow {
            target_row,
            rows: self.rows[start..=end].to_vec(),
        })
    }
}

/// Window around a line of the new file, or of the old file when the line was removed.
pub fn locate_in_diff(map: &DiffLineMap, line: u32, context: usize) -> Option<DiffWindow> {
    map.locate(line, Side::Right, context)
        .or_else(|| map.locate(line, Side::Left, context))
}

/// Lines around `line` (1-based) of an original file; targets past EOF are clamped.
pub fn locate_in_file(content: &str, line: usize, context: usize) -> Option<FileWindow> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() || line == 0 {
        return None;
    }

    let clamped = line > lines.len();
    let target = line.min(lines.len());
    let start = target.saturating_sub(context).max(1);
    let end = target.saturating_add(context).min(lines.len());

    Some(FileWindow {
        target,
        clamped,
        lines: (start..=end).map(|n| (n, lines[n - 1].to_string())).collect(),
    })
}
