//! Prompt rendering. Everything here is pure string work.

use sqlsage_core::models::{ColumnDescriptor, ForeignKeyDescriptor};

/// Render `Table <t>:` blocks for `tables`, in the order given.
pub fn render_schema_info(columns: &[ColumnDescriptor], tables: &[String]) -> String {
    tables
        .iter()
        .map(|table| {
            let mut block = format!("Table {}:", table);
            for column in columns.iter().filter(|c| &c.table_name == table) {
                block.push_str(&format!("\n  {}: {}", column.column_name, column.data_type));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Inverse of [`render_schema_info`].
pub fn parse_schema_info(text: &str) -> Vec<ColumnDescriptor> {
    let mut columns = Vec::new();
    let mut current: Option<&str> = None;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("Table ") {
            current = rest.strip_suffix(':');
        } else if let Some(rest) = line.strip_prefix("  ") {
            let (Some(table), Some((name, ty))) = (current, rest.split_once(": ")) else {
                continue;
            };
            columns.push(ColumnDescriptor {
                table_name: table.to_string(),
                column_name: name.to_string(),
                data_type: ty.to_string(),
            });
        }
    }
    columns
}

/// `table.constraint → referenced_table`, one line per key whose source table is relevant.
pub fn render_foreign_keys(foreign_keys: &[ForeignKeyDescriptor], tables: &[String]) -> String {
    foreign_keys
        .iter()
        .filter(|fk| tables.iter().any(|t| t == &fk.table_name))
        .map(|fk| format!("{}.{} → {}", fk.table_name, fk.constraint_name, fk.referenced_table))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(question: &str, schema_info: &str, foreign_keys: &str) -> String {
    format!(
        "You are a PostgreSQL expert. Generate SQL for this database:

Database Schema:
{schema_info}

Foreign Key Relationships:
{foreign_keys}

User Question: {question}

Rules:
1. Use explicit JOINs based on the foreign key relationships above
2. Only select the columns needed to answer the question
3. Return exactly one SQL query between ```sql and ``` markers
4. Add SQL comments for complex logic

Respond ONLY with the SQL query:"
    )
}
