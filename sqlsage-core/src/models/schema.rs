use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ColumnDescriptor {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForeignKeyDescriptor {
    pub table_name: String,
    #[serde(rename = "foreign_key")]
    pub constraint_name: String,
    #[serde(rename = "referred_table")]
    pub referenced_table: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl SchemaSnapshot {
    /// Distinct table names in order of first appearance.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for column in &self.columns {
            if !names.iter().any(|n| n == &column.table_name) {
                names.push(column.table_name.clone());
            }
        }
        names
    }

    pub fn columns_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ColumnDescriptor> + 'a {
        self.columns.iter().filter(move |c| c.table_name == table)
    }
}
