//! Ruling-line table detection over a page content stream.
//!
//! Stroked and filled path edges are collected in user space, snapped onto
//! shared rows and columns, and grouped into grids where they touch. Text
//! runs positioned by the text matrix are then dropped into the grid cells.

use crate::error::TableError;
use crate::models::TableShape;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;

/// A detected table: rows of cells, top row first. Empty cells are `""`.
pub type Table = Vec<Vec<String>>;

#[derive(Debug, Clone, Copy)]
pub struct TableSettings {
    pub snap_tolerance: f32,
    pub join_tolerance: f32,
    pub edge_min_length: f32,
    pub min_rows: usize,
    pub min_cols: usize,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            edge_min_length: 3.0,
            min_rows: 2,
            min_cols: 2,
        }
    }
}

pub fn table_shape(table: &Table) -> TableShape {
    TableShape {
        row_count: table.len(),
        col_count: table.first().map_or(0, Vec::len),
    }
}

/// Renders tables as padded text blocks, one `Table n:` header each.
pub fn format_tables(tables: &[Table]) -> String {
    if tables.is_empty() {
        return String::new();
    }

    let mut lines = Vec::new();
    for (position, table) in tables.iter().enumerate() {
        lines.push(format!("Table {}:", position + 1));

        let columns = table.first().map_or(0, Vec::len);
        let widths = (0..columns)
            .map(|column| {
                table
                    .iter()
                    .map(|row| row.get(column).map_or(0, |cell| cell.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect::<Vec<_>>();

        for row in table {
            let rendered = row
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join(" | ");
            lines.push(rendered);
        }

        let divider = widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1);
        lines.push("-".repeat(divider));
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Turns the bytes of a shown string into text for one font resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontDecoder {
    /// A single-byte encoding known to lopdf, e.g. `WinAnsiEncoding`.
    Simple(String),
    /// Two-byte character ids mapped through the font's `ToUnicode` CMap.
    Cid(BTreeMap<u16, String>),
}

impl FontDecoder {
    /// `None` for an Identity-encoded font without a usable `ToUnicode` map.
    pub fn from_font(document: &Document, font: &Dictionary) -> Option<Self> {
        let encoding = font.get_font_encoding();
        if encoding.starts_with("Identity") {
            to_unicode_map(document, font)
                .filter(|map| !map.is_empty())
                .map(FontDecoder::Cid)
        } else {
            Some(FontDecoder::Simple(encoding.to_string()))
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FontDecoder::Simple(encoding) => Document::decode_text(Some(encoding.as_str()), bytes),
            FontDecoder::Cid(map) => bytes
                .chunks(2)
                .map(|pair| map.get(&cid(pair)).map_or("\u{fffd}", String::as_str))
                .collect(),
        }
    }
}

/// Decoders for the font resources of one page, keyed by resource name.
#[derive(Debug, Clone, Default)]
pub struct PageFonts {
    decoders: BTreeMap<Vec<u8>, FontDecoder>,
}

impl PageFonts {
    pub fn load(document: &Document, page_id: ObjectId) -> Self {
        let decoders = document
            .get_page_fonts(page_id)
            .into_iter()
            .filter_map(|(name, font)| Some((name, FontDecoder::from_font(document, font)?)))
            .collect();
        Self { decoders }
    }

    pub fn insert(&mut self, name: impl Into<Vec<u8>>, decoder: FontDecoder) {
        self.decoders.insert(name.into(), decoder);
    }

    /// Strings shown before any `Tf`, or with an unknown font, fall back to
    /// UTF-16BE with a byte-order mark or Latin-1.
    fn decode(&self, font: Option<&[u8]>, bytes: &[u8]) -> String {
        match font.and_then(|name| self.decoders.get(name)) {
            Some(decoder) => decoder.decode(bytes),
            None => decode_pdf_string(bytes),
        }
    }
}

fn to_unicode_map(document: &Document, font: &Dictionary) -> Option<BTreeMap<u16, String>> {
    let (_, object) = document.dereference(font.get(b"ToUnicode").ok()?).ok()?;
    let stream = object.as_stream().ok()?;
    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    Some(parse_to_unicode(&data))
}

#[derive(Debug, PartialEq)]
enum CmapToken {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

fn cmap_tokens(data: &[u8]) -> Vec<CmapToken> {
    let mut tokens = Vec::new();
    let mut position = 0;
    while position < data.len() {
        match data[position] {
            b'<' if data.get(position + 1) == Some(&b'<') => position += 2,
            b'>' if data.get(position + 1) == Some(&b'>') => position += 2,
            b'<' => {
                let end = data[position..]
                    .iter()
                    .position(|byte| *byte == b'>')
                    .map_or(data.len(), |offset| position + offset);
                let mut digits = data[position + 1..end]
                    .iter()
                    .filter_map(|byte| char::from(*byte).to_digit(16))
                    .map(|digit| digit as u8)
                    .collect::<Vec<_>>();
                if digits.len() % 2 == 1 {
                    digits.push(0);
                }
                tokens.push(CmapToken::Hex(
                    digits.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect(),
                ));
                position = end + 1;
            }
            b'[' => {
                tokens.push(CmapToken::Open);
                position += 1;
            }
            b']' => {
                tokens.push(CmapToken::Close);
                position += 1;
            }
            b'%' => {
                while position < data.len() && data[position] != b'\n' && data[position] != b'\r' {
                    position += 1;
                }
            }
            b'(' => {
                while position < data.len() && data[position] != b')' {
                    position += 1;
                }
                position += 1;
            }
            byte if byte.is_ascii_whitespace() => position += 1,
            _ => {
                let start = position;
                while position < data.len()
                    && !data[position].is_ascii_whitespace()
                    && !b"<>[]()%".contains(&data[position])
                {
                    position += 1;
                }
                if position == start {
                    position += 1;
                } else {
                    tokens.push(CmapToken::Word(
                        String::from_utf8_lossy(&data[start..position]).into_owned(),
                    ));
                }
            }
        }
    }
    tokens
}

fn cid(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, byte| (acc << 8) | u16::from(*byte))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks(2).map(cid).collect()
}

/// Reads the `bfchar` and `bfrange` sections of a `ToUnicode` CMap.
pub fn parse_to_unicode(data: &[u8]) -> BTreeMap<u16, String> {
    let tokens = cmap_tokens(data);
    let mut map = BTreeMap::new();
    let mut index = 0;

    while index < tokens.len() {
        match &tokens[index] {
            CmapToken::Word(word) if word == "beginbfchar" => {
                index += 1;
                while let (Some(CmapToken::Hex(source)), Some(CmapToken::Hex(target))) =
                    (tokens.get(index), tokens.get(index + 1))
                {
                    map.insert(cid(source), String::from_utf16_lossy(&utf16_units(target)));
                    index += 2;
                }
            }
            CmapToken::Word(word) if word == "beginbfrange" => {
                index += 1;
                while let (Some(CmapToken::Hex(low)), Some(CmapToken::Hex(high))) =
                    (tokens.get(index), tokens.get(index + 1))
                {
                    let (low, high) = (cid(low), cid(high));
                    match tokens.get(index + 2) {
                        Some(CmapToken::Hex(target)) => {
                            let base = utf16_units(target);
                            for (offset, code) in (low..=high).enumerate() {
                                let mut units = base.clone();
                                if let Some(last) = units.last_mut() {
                                    *last = last.wrapping_add(offset as u16);
                                }
                                map.insert(code, String::from_utf16_lossy(&units));
                            }
                            index += 3;
                        }
                        Some(CmapToken::Open) => {
                            index += 3;
                            let mut code = low;
                            while let Some(CmapToken::Hex(target)) = tokens.get(index) {
                                if code <= high {
                                    map.insert(code, String::from_utf16_lossy(&utf16_units(target)));
                                }
                                code = code.saturating_add(1);
                                index += 1;
                            }
                            if tokens.get(index) == Some(&CmapToken::Close) {
                                index += 1;
                            }
                        }
                        _ => break,
                    }
                }
            }
            _ => index += 1,
        }
    }
    map
}

pub fn extract_page_tables(
    document: &Document,
    page_id: ObjectId,
    settings: &TableSettings,
) -> Result<Vec<Table>, TableError> {
    let raw = document
        .get_page_content(page_id)
        .map_err(|error| TableError::Content(error.to_string()))?;
    let content = Content::decode(&raw).map_err(|error| TableError::Content(error.to_string()))?;
    detect_tables(&content.operations, &PageFonts::load(document, page_id), settings)
}

pub fn detect_tables(
    operations: &[Operation],
    fonts: &PageFonts,
    settings: &TableSettings,
) -> Result<Vec<Table>, TableError> {
    let page = PageScan::run(operations, fonts)?;
    let min_rows = settings.min_rows.max(1);
    let min_cols = settings.min_cols.max(1);

    let mut horizontals = Vec::new();
    let mut verticals = Vec::new();
    for edge in &page.edges {
        classify_edge(edge, settings, &mut horizontals, &mut verticals);
    }

    snap(&mut horizontals, settings.snap_tolerance);
    snap(&mut verticals, settings.snap_tolerance);
    let horizontals = merge_collinear(horizontals, settings.join_tolerance);
    let verticals = merge_collinear(verticals, settings.join_tolerance);

    let mut tables = Vec::new();
    for (rows, columns) in grids(&horizontals, &verticals, settings.join_tolerance) {
        if rows.len() < min_rows + 1 || columns.len() < min_cols + 1 {
            continue;
        }
        tables.push(fill_grid(&rows, &columns, &page.runs, settings.snap_tolerance));
    }

    // Top of the page first.
    tables.sort_by(|left, right| right.0.total_cmp(&left.0));
    Ok(tables.into_iter().map(|(_, table)| table).collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translate(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    /// `self` applied first, then `other`.
    fn then(self, other: Matrix) -> Self {
        Self {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: (f32, f32),
    to: (f32, f32),
}

#[derive(Debug, Clone)]
struct TextRun {
    x: f32,
    y: f32,
    text: String,
}

/// An axis-aligned ruling: `at` is y for horizontals, x for verticals.
#[derive(Debug, Clone, Copy)]
struct Rule {
    at: f32,
    start: f32,
    end: f32,
}

#[derive(Default)]
struct PageScan {
    font: Option<Vec<u8>>,
    ctm: Option<Matrix>,
    saved: Vec<Matrix>,
    path: Vec<Edge>,
    subpath_start: Option<(f32, f32)>,
    cursor: Option<(f32, f32)>,
    text_matrix: Option<Matrix>,
    line_matrix: Option<Matrix>,
    leading: f32,
    last_origin: Option<(f32, f32)>,
    edges: Vec<Edge>,
    runs: Vec<TextRun>,
}

impl PageScan {
    fn run(operations: &[Operation], fonts: &PageFonts) -> Result<Self, TableError> {
        let mut scan = PageScan::default();
        for operation in operations {
            scan.step(operation, fonts)?;
        }
        Ok(scan)
    }

    fn ctm(&self) -> Matrix {
        self.ctm.unwrap_or(Matrix::IDENTITY)
    }

    fn step(&mut self, operation: &Operation, fonts: &PageFonts) -> Result<(), TableError> {
        let operator = operation.operator.as_str();
        let font = self.font.clone();
        let shown = |object: &Object| match object {
            Object::String(bytes, _) => Some(fonts.decode(font.as_deref(), bytes)),
            _ => None,
        };
        match operator {
            "q" => self.saved.push(self.ctm()),
            "Q" => self.ctm = Some(self.saved.pop().unwrap_or(Matrix::IDENTITY)),
            "cm" => {
                let m = matrix_operands(operation)?;
                self.ctm = Some(m.then(self.ctm()));
            }
            "m" => {
                let [x, y] = numbers::<2>(operation)?;
                let point = self.ctm().apply(x, y);
                self.subpath_start = Some(point);
                self.cursor = Some(point);
            }
            "l" => {
                let [x, y] = numbers::<2>(operation)?;
                let point = self.ctm().apply(x, y);
                if let Some(from) = self.cursor {
                    self.path.push(Edge { from, to: point });
                }
                self.cursor = Some(point);
            }
            "c" | "v" | "y" => {
                let values = operation
                    .operands
                    .iter()
                    .map(number)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| malformed(operator))?;
                if let [.., x, y] = values.as_slice() {
                    self.cursor = Some(self.ctm().apply(*x, *y));
                }
            }
            "re" => {
                let [x, y, width, height] = numbers::<4>(operation)?;
                let ctm = self.ctm();
                let corners = [
                    ctm.apply(x, y),
                    ctm.apply(x + width, y),
                    ctm.apply(x + width, y + height),
                    ctm.apply(x, y + height),
                ];
                for index in 0..4 {
                    self.path.push(Edge {
                        from: corners[index],
                        to: corners[(index + 1) % 4],
                    });
                }
                self.subpath_start = Some(corners[0]);
                self.cursor = Some(corners[0]);
            }
            "h" => self.close_subpath(),
            "s" | "b" | "b*" => {
                self.close_subpath();
                self.paint();
            }
            "S" | "f" | "F" | "f*" | "B" | "B*" => self.paint(),
            "n" => self.discard_path(),
            "BT" => {
                self.text_matrix = Some(Matrix::IDENTITY);
                self.line_matrix = Some(Matrix::IDENTITY);
                self.last_origin = None;
            }
            "ET" => {
                self.text_matrix = None;
                self.line_matrix = None;
            }
            "Tm" => {
                let m = matrix_operands(operation)?;
                self.text_matrix = Some(m);
                self.line_matrix = Some(m);
            }
            "Td" => {
                let [tx, ty] = numbers::<2>(operation)?;
                self.move_line(tx, ty);
            }
            "TD" => {
                let [tx, ty] = numbers::<2>(operation)?;
                self.leading = -ty;
                self.move_line(tx, ty);
            }
            "TL" => {
                let [leading] = numbers::<1>(operation)?;
                self.leading = leading;
            }
            "T*" => self.move_line(0.0, -self.leading),
            "Tf" => {
                let name = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                    .ok_or_else(|| malformed(operator))?;
                self.font = Some(name.to_vec());
            }
            "Tj" => {
                let text = operation
                    .operands
                    .first()
                    .and_then(shown)
                    .ok_or_else(|| malformed(operator))?;
                self.show(text);
            }
            "'" => {
                self.move_line(0.0, -self.leading);
                let text = operation
                    .operands
                    .first()
                    .and_then(shown)
                    .ok_or_else(|| malformed(operator))?;
                self.show(text);
            }
            "\"" => {
                self.move_line(0.0, -self.leading);
                let text = operation
                    .operands
                    .get(2)
                    .and_then(shown)
                    .ok_or_else(|| malformed(operator))?;
                self.show(text);
            }
            "TJ" => {
                let parts = operation
                    .operands
                    .first()
                    .and_then(|operand| match operand {
                        Object::Array(parts) => Some(parts),
                        _ => None,
                    })
                    .ok_or_else(|| malformed(operator))?;
                let mut text = String::new();
                for part in parts {
                    if let Some(piece) = shown(part) {
                        text.push_str(&piece);
                    } else if number(part).is_some_and(|kern| kern < -200.0) {
                        text.push(' ');
                    }
                }
                self.show(text);
            }
            _ => {}
        }
        Ok(())
    }

    fn close_subpath(&mut self) {
        if let (Some(from), Some(to)) = (self.cursor, self.subpath_start) {
            self.path.push(Edge { from, to });
            self.cursor = Some(to);
        }
    }

    fn paint(&mut self) {
        self.edges.append(&mut self.path);
        self.discard_path();
    }

    fn discard_path(&mut self) {
        self.path.clear();
        self.subpath_start = None;
        self.cursor = None;
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        let line = Matrix::translate(tx, ty).then(self.line_matrix.unwrap_or(Matrix::IDENTITY));
        self.line_matrix = Some(line);
        self.text_matrix = Some(line);
    }

    fn show(&mut self, text: String) {
        let placement = self.text_matrix.unwrap_or(Matrix::IDENTITY).then(self.ctm());
        let origin = (placement.e, placement.f);

        if self.last_origin == Some(origin) {
            if let Some(last) = self.runs.last_mut() {
                last.text.push_str(&text);
                return;
            }
        }

        self.last_origin = Some(origin);
        self.runs.push(TextRun {
            x: origin.0,
            y: origin.1,
            text,
        });
    }
}

fn malformed(operator: &str) -> TableError {
    TableError::Operand {
        operator: operator.to_string(),
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operation: &Operation) -> Result<[f32; N], TableError> {
    let mut values = [0f32; N];
    if operation.operands.len() < N {
        return Err(malformed(&operation.operator));
    }
    for (slot, operand) in values.iter_mut().zip(&operation.operands) {
        *slot = number(operand).ok_or_else(|| malformed(&operation.operator))?;
    }
    Ok(values)
}

fn matrix_operands(operation: &Operation) -> Result<Matrix, TableError> {
    let [a, b, c, d, e, f] = numbers::<6>(operation)?;
    Ok(Matrix { a, b, c, d, e, f })
}

/// UTF-16BE when the string carries a byte-order mark, Latin-1 otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }
    bytes
        .iter()
        .map(|byte| char::from(*byte))
        .filter(|ch| !ch.is_control())
        .collect()
}

fn classify_edge(
    edge: &Edge,
    settings: &TableSettings,
    horizontals: &mut Vec<Rule>,
    verticals: &mut Vec<Rule>,
) {
    let (x0, y0) = edge.from;
    let (x1, y1) = edge.to;
    let width = (x1 - x0).abs();
    let height = (y1 - y0).abs();

    if height <= settings.snap_tolerance && width >= settings.edge_min_length {
        horizontals.push(Rule {
            at: (y0 + y1) / 2.0,
            start: x0.min(x1),
            end: x0.max(x1),
        });
    } else if width <= settings.snap_tolerance && height >= settings.edge_min_length {
        verticals.push(Rule {
            at: (x0 + x1) / 2.0,
            start: y0.min(y1),
            end: y0.max(y1),
        });
    }
}

/// Moves rules within `tolerance` of each other onto their mean position.
fn snap(rules: &mut [Rule], tolerance: f32) {
    rules.sort_by(|left, right| left.at.total_cmp(&right.at));

    let mut start = 0;
    while start < rules.len() {
        let mut end = start + 1;
        while end < rules.len() && rules[end].at - rules[end - 1].at <= tolerance {
            end += 1;
        }
        let mean = rules[start..end].iter().map(|rule| rule.at).sum::<f32>() / (end - start) as f32;
        for rule in &mut rules[start..end] {
            rule.at = mean;
        }
        start = end;
    }
}

fn merge_collinear(mut rules: Vec<Rule>, tolerance: f32) -> Vec<Rule> {
    rules.sort_by(|left, right| {
        left.at
            .total_cmp(&right.at)
            .then_with(|| left.start.total_cmp(&right.start))
    });

    let mut merged: Vec<Rule> = Vec::with_capacity(rules.len());
    for rule in rules {
        match merged.last_mut() {
            Some(last) if last.at == rule.at && rule.start <= last.end + tolerance => {
                last.end = last.end.max(rule.end);
            }
            _ => merged.push(rule),
        }
    }
    merged
}

fn touches(horizontal: &Rule, vertical: &Rule, tolerance: f32) -> bool {
    vertical.at >= horizontal.start - tolerance
        && vertical.at <= horizontal.end + tolerance
        && horizontal.at >= vertical.start - tolerance
        && horizontal.at <= vertical.end + tolerance
}

fn find_root(parents: &mut [usize], mut node: usize) -> usize {
    while parents[node] != node {
        parents[node] = parents[parents[node]];
        node = parents[node];
    }
    node
}

/// Groups touching rules into grids. Returns row boundaries (descending y)
/// and column boundaries (ascending x) per grid.
fn grids(horizontals: &[Rule], verticals: &[Rule], tolerance: f32) -> Vec<(Vec<f32>, Vec<f32>)> {
    let offset = horizontals.len();
    let mut parents = (0..offset + verticals.len()).collect::<Vec<_>>();

    for (h_index, horizontal) in horizontals.iter().enumerate() {
        for (v_index, vertical) in verticals.iter().enumerate() {
            if touches(horizontal, vertical, tolerance) {
                let left = find_root(&mut parents, h_index);
                let right = find_root(&mut parents, offset + v_index);
                if left != right {
                    parents[left] = right;
                }
            }
        }
    }

    let mut groups: Vec<(usize, Vec<f32>, Vec<f32>)> = Vec::new();
    for node in 0..parents.len() {
        let root = find_root(&mut parents, node);
        let position = match groups.iter().position(|(group_root, _, _)| *group_root == root) {
            Some(position) => position,
            None => {
                groups.push((root, Vec::new(), Vec::new()));
                groups.len() - 1
            }
        };
        if node < offset {
            groups[position].1.push(horizontals[node].at);
        } else {
            groups[position].2.push(verticals[node - offset].at);
        }
    }

    groups
        .into_iter()
        .map(|(_, mut rows, mut columns)| {
            rows.sort_by(|left, right| right.total_cmp(left));
            rows.dedup();
            columns.sort_by(|left, right| left.total_cmp(right));
            columns.dedup();
            (rows, columns)
        })
        .collect()
}

/// Returns the grid's top edge with its cells filled from `runs`.
fn fill_grid(rows: &[f32], columns: &[f32], runs: &[TextRun], tolerance: f32) -> (f32, Table) {
    let mut cells = vec![vec![Vec::<&TextRun>::new(); columns.len() - 1]; rows.len() - 1];

    for run in runs {
        let row = rows
            .windows(2)
            .position(|bounds| run.y <= bounds[0] + tolerance && run.y > bounds[1]);
        let column = columns
            .windows(2)
            .position(|bounds| run.x >= bounds[0] - tolerance && run.x < bounds[1]);
        if let (Some(row), Some(column)) = (row, column) {
            cells[row][column].push(run);
        }
    }

    let table = cells
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|mut cell_runs| {
                    cell_runs.sort_by(|left, right| {
                        right.y.total_cmp(&left.y).then_with(|| left.x.total_cmp(&right.x))
                    });
                    cell_runs
                        .iter()
                        .map(|run| run.text.trim())
                        .filter(|text| !text.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect()
        })
        .collect();

    (rows[0], table)
}
