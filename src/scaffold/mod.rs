//! Scaffolding for new export sources
//!
//! `make-export Users` writes `<base>/export/users.rs`; `make-export
//! Reports/MonthlySales` writes `<base>/export/reports/monthly_sales.rs`.
//! The generated file holds a unit struct implementing `ExportSource` with no
//! headings and no rows, ready to be filled in.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, ScaffoldError};

/// Directory below the base path that receives generated sources
pub const EXPORT_DIR: &str = "export";

const TEMPLATE: &str = r#"use async_trait::async_trait;
use csvexport::export::{ExportSource, RowProvider, Value};
use csvexport::Result;

/// {{description}}
pub struct {{name}};

#[async_trait]
impl ExportSource for {{name}} {
    type Row = Vec<Value>;

    fn headings(&self) -> Vec<String> {
        Vec::new()
    }

    async fn query(&self) -> Result<RowProvider<Self::Row>> {
        Ok(Vec::new().into())
    }

    fn map(&self, row: &Self::Row) -> Result<Vec<Value>> {
        Ok(row.clone())
    }
}
"#;

/// A validated `Sub/Name` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    /// Module directories, in order
    pub modules: Vec<String>,
    /// Type name of the generated struct
    pub type_name: String,
}

impl SourceName {
    /// Parse `Name` or `Sub/Name` (`\` and `::` are accepted as separators)
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().replace("::", "/").replace('\\', "/");
        let mut parts: Vec<&str> = normalized.split('/').collect();
        let type_name = parts.pop().unwrap_or_default();

        if !is_type_name(type_name) || !parts.iter().all(|p| is_type_name(p) || is_module_name(p)) {
            return Err(ScaffoldError::InvalidName(raw.to_string()).into());
        }

        Ok(Self {
            modules: parts.iter().map(|p| to_snake_case(p)).collect(),
            type_name: type_name.to_string(),
        })
    }

    /// Path of the generated file relative to the base directory
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(EXPORT_DIR);
        path.extend(&self.modules);
        path.push(format!("{}.rs", to_snake_case(&self.type_name)));
        path
    }
}

/// Render the source file for `name`
pub fn render(name: &SourceName) -> String {
    let description = if name.modules.is_empty() {
        format!("{} export", name.type_name)
    } else {
        format!("{} export ({})", name.type_name, name.modules.join("::"))
    };

    TEMPLATE
        .replace("{{name}}", &name.type_name)
        .replace("{{description}}", &description)
}

/// Generate a new export source below `base`
///
/// # Arguments
/// * `base` - Project source directory, e.g. `src`
/// * `raw_name` - `Name` or `Sub/Name`
///
/// # Returns
/// * `Result<PathBuf>` - Path of the created file; an existing file is never overwritten
pub fn generate(base: &Path, raw_name: &str) -> Result<PathBuf> {
    let name = SourceName::parse(raw_name)?;
    let path = base.join(name.relative_path());

    if path.exists() {
        return Err(ScaffoldError::AlreadyExists(path.display().to_string()).into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(ScaffoldError::AlreadyExists(path.display().to_string()).into());
        }
        Err(e) => return Err(e.into()),
    };
    std::io::Write::write_all(&mut file, render(&name).as_bytes())?;

    info!("Created export source {} at {}", name.type_name, path.display());
    Ok(path)
}

fn is_type_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_module_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// `MonthlySales` -> `monthly_sales`, `HTTPLog` -> `http_log`
fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
