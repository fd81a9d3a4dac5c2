//! Metadata context rendering.
//!
//! Turns a [`MetadataSnapshot`] into the text block embedded in the system
//! prompt. Output is deterministic: schemas by name, tables by name, columns by
//! ordinal position. When the rendering exceeds the character budget it is
//! shortened in a fixed order:
//!
//! 1. column descriptions, last column first;
//! 2. table descriptions, last table first;
//! 3. whole tables, last table first (a schema header goes with its last table).
//!
//! A table is never cut in the middle: if it is present, all its columns are.
//! Columns carry their [`TypeFamily`], not the engine's native type name.

use common::models::metadata::{ColumnDescriptor, MetadataSnapshot, TypeFamily};
use serde::Serialize;
use utoipa::ToSchema;

/// Longest description kept in the prompt, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 200;

const DESCRIPTION_SEPARATOR: &str = " -- ";

/// Rendered context plus what had to be left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AssembledContext {
    pub text: String,
    pub tables_included: usize,
    pub tables_total: usize,
    pub truncated: bool,
}

impl AssembledContext {
    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }
}

struct TableBlock {
    schema: String,
    name: String,
    description: Option<String>,
    columns: Vec<ColumnLine>,
}

struct ColumnLine {
    name: String,
    data_type: TypeFamily,
    nullable: bool,
    description: Option<String>,
}

impl TableBlock {
    fn header(&self) -> String {
        let mut line = format!("  table {}.{}", self.schema, self.name);
        if let Some(d) = &self.description {
            line.push_str(DESCRIPTION_SEPARATOR);
            line.push_str(d);
        }
        line
    }
}

impl ColumnLine {
    fn render(&self) -> String {
        let null = if self.nullable { "NULL" } else { "NOT NULL" };
        let mut line = format!("    {} {} {}", self.name, self.data_type, null);
        if let Some(d) = &self.description {
            line.push_str(DESCRIPTION_SEPARATOR);
            line.push_str(d);
        }
        line
    }
}

fn schema_header(schema: &str) -> String {
    format!("schema {}", schema)
}

/// Renders `snapshot` within `budget` characters.
pub fn assemble(snapshot: &MetadataSnapshot, budget: usize) -> AssembledContext {
    let mut blocks = build_blocks(snapshot);
    let tables_total = blocks.len();
    let mut len = rendered_len(&blocks);
    let truncated = len > budget;

    // Column descriptions, last first.
    'columns: for block in blocks.iter_mut().rev() {
        for column in block.columns.iter_mut().rev() {
            if len <= budget {
                break 'columns;
            }
            if let Some(d) = column.description.take() {
                len -= description_len(&d);
            }
        }
    }

    // Table descriptions, last first.
    for block in blocks.iter_mut().rev() {
        if len <= budget {
            break;
        }
        if let Some(d) = block.description.take() {
            len -= description_len(&d);
        }
    }

    // Whole tables, last first.
    while len > budget && !blocks.is_empty() {
        let Some(block) = blocks.pop() else { break };
        let mut removed_chars = block.header().chars().count();
        let mut removed_lines = 1 + block.columns.len();
        removed_chars += block
            .columns
            .iter()
            .map(|c| c.render().chars().count())
            .sum::<usize>();
        let schema_emptied = blocks.last().map_or(true, |prev| prev.schema != block.schema);
        if schema_emptied {
            removed_chars += schema_header(&block.schema).chars().count();
            removed_lines += 1;
        }
        len = if blocks.is_empty() {
            0
        } else {
            len - removed_chars - removed_lines
        };
    }

    let text = render(&blocks);
    let text = if text.chars().count() > budget {
        String::new()
    } else {
        text
    };
    let tables_included = if text.is_empty() { 0 } else { blocks.len() };

    AssembledContext {
        text,
        tables_included,
        tables_total,
        truncated,
    }
}

fn build_blocks(snapshot: &MetadataSnapshot) -> Vec<TableBlock> {
    let mut tables: Vec<_> = snapshot.tables.iter().collect();
    tables.sort_by(|a, b| {
        (a.schema_name.as_str(), a.table_name.as_str())
            .cmp(&(b.schema_name.as_str(), b.table_name.as_str()))
    });

    tables
        .into_iter()
        .map(|table| {
            let mut columns: Vec<&ColumnDescriptor> = snapshot
                .columns
                .iter()
                .filter(|c| c.schema_name == table.schema_name && c.table_name == table.table_name)
                .collect();
            columns.sort_by(|a, b| {
                (a.ordinal_position, a.column_name.as_str())
                    .cmp(&(b.ordinal_position, b.column_name.as_str()))
            });
            TableBlock {
                schema: sanitize(&table.schema_name, None),
                name: sanitize(&table.table_name, None),
                description: clean_description(table.description.as_deref()),
                columns: columns
                    .into_iter()
                    .map(|c| ColumnLine {
                        name: sanitize(&c.column_name, None),
                        data_type: c.data_type,
                        nullable: c.nullable,
                        description: clean_description(c.description.as_deref()),
                    })
                    .collect(),
            }
        })
        .collect()
}

fn render(blocks: &[TableBlock]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current_schema: Option<&str> = None;
    for block in blocks {
        if current_schema != Some(block.schema.as_str()) {
            lines.push(schema_header(&block.schema));
            current_schema = Some(block.schema.as_str());
        }
        lines.push(block.header());
        lines.extend(block.columns.iter().map(ColumnLine::render));
    }
    lines.join("\n")
}

fn rendered_len(blocks: &[TableBlock]) -> usize {
    render(blocks).chars().count()
}

fn description_len(description: &str) -> usize {
    DESCRIPTION_SEPARATOR.len() + description.chars().count()
}

fn clean_description(raw: Option<&str>) -> Option<String> {
    raw.map(|d| sanitize(d, Some(MAX_DESCRIPTION_CHARS)))
        .filter(|d| !d.is_empty())
}

/// Makes catalog text safe to embed in a prompt line.
///
/// Control characters and whitespace runs become one space and code fences are
/// neutralized, so a comment cannot start a new line or close the metadata block.
pub fn sanitize(raw: &str, max_chars: Option<usize>) -> String {
    let spaced: String = raw
        .chars()
        .map(|c| if c.is_control() || c.is_whitespace() { ' ' } else { c })
        .collect();
    let collapsed = spaced.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
    let defenced = collapsed.replace("```", "'''");
    match max_chars {
        Some(max) if defenced.chars().count() > max => {
            defenced.chars().take(max).collect::<String>().trim_end().to_string()
        }
        _ => defenced,
    }
}
