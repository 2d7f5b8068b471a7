use crate::model::metadata::{DeployFlags, IndexMeta, TableMeta};

/// Index of a mapped table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    name: Option<String>,
    unique: bool,
    columns: Vec<String>,
}

impl IndexDescriptor {
    pub(crate) fn from_meta(meta: IndexMeta) -> Self {
        let name = Some(meta.name).filter(|n| !n.trim().is_empty());
        Self {
            name,
            unique: meta.unique,
            columns: meta.columns,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Declared name, or `<table>_uniqN` for the 1-based `position`
    pub fn resolved_name(&self, table: &str, position: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}_uniq{}", table, position),
        }
    }
}

/// Table-level part of a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    name: String,
    indexes: Vec<IndexDescriptor>,
    deploy: DeployFlags,
    creation_suffix: String,
}

impl TableDescriptor {
    pub(crate) fn from_meta(meta: TableMeta) -> Self {
        Self {
            name: meta.name,
            indexes: meta
                .indexes
                .into_iter()
                .map(IndexDescriptor::from_meta)
                .collect(),
            deploy: meta.deploy,
            creation_suffix: meta.creation_suffix,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    pub fn deploy(&self) -> DeployFlags {
        self.deploy
    }

    pub fn creation_suffix(&self) -> &str {
        &self.creation_suffix
    }
}
